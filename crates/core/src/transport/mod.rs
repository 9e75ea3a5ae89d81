//! Network transport for outbound RTP.
//!
//! RTP rides on plain UDP ([`udp`]): one connected socket per stream,
//! fire-and-forget sends, no acknowledgment. The stream driver tracks the
//! socket's lifecycle with [`LinkState`] and reacts to [`PathStatus`]
//! notifications from the platform's network path monitor.
//!
//! ```text
//! Uninitialized ─▶ Connecting ─▶ Ready ◀─▶ Degraded
//!                      ▲           │
//!                      └─ resume ◀─┴─▶ Stopped
//! ```

pub mod udp;

use std::fmt;

pub use udp::UdpTransport;

/// Lifecycle of a stream's outbound socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Stream constructed, no socket opened yet.
    #[default]
    Uninitialized,
    /// Opening a socket towards the destination.
    Connecting,
    /// Socket open; packets are being sent.
    Ready,
    /// Network path lost or socket creation failed; reconnect pending.
    Degraded,
    /// Streaming switched off; socket released, counters kept.
    Stopped,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Network path availability reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// An interface can reach the destination (interface came up, Wi-Fi
    /// switched, ...). Triggers a fresh socket.
    Satisfied,
    /// No usable path.
    Unsatisfied,
}
