//! Error types for the RTP streamer library.

use std::fmt;

/// Errors that can occur in the RTP streamer library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Input**: [`Parse`](Self::Parse): malformed length-prefixed access units.
/// - **Transport**: [`Io`](Self::Io), [`AddressResolution`](Self::AddressResolution),
///   [`NotConnected`](Self::NotConnected): socket/network failures.
/// - **Setup**: [`InvalidConfig`](Self::InvalidConfig): rejected once when a
///   stream is started, never per packet.
/// - **Queue**: [`QueueFull`](Self::QueueFull), [`Disconnected`](Self::Disconnected):
///   the stream worker cannot accept more work.
///
/// Transport and input errors never stop a running stream; the driver logs
/// them and moves on to the next packet or access unit.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a length-prefixed access unit.
    #[error("access unit parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Stream configuration cannot produce valid packets.
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// The destination host did not resolve to any socket address.
    #[error("could not resolve destination: {0}")]
    AddressResolution(String),

    /// A send was attempted while no socket is open (stopped or degraded).
    #[error("transport not connected")]
    NotConnected,

    /// The access-unit queue is full; the frame was dropped.
    #[error("stream queue full")]
    QueueFull,

    /// The stream worker has exited.
    #[error("stream worker disconnected")]
    Disconnected,
}

/// Specific kind of access-unit parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Fewer than 4 bytes left where a length prefix was expected.
    TruncatedLength { remaining: usize },
    /// The length prefix declares more bytes than the buffer holds.
    TruncatedNal { declared: usize, remaining: usize },
    /// Buffer is shorter than a 12-byte RTP header.
    ShortRtpHeader { len: usize },
    /// RTP version field is not 2.
    BadRtpVersion { version: u8 },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedLength { remaining } => {
                write!(f, "truncated length prefix ({remaining} bytes left)")
            }
            Self::TruncatedNal {
                declared,
                remaining,
            } => write!(
                f,
                "NAL unit declares {declared} bytes but only {remaining} remain"
            ),
            Self::ShortRtpHeader { len } => write!(f, "RTP packet too short ({len} bytes)"),
            Self::BadRtpVersion { version } => write!(f, "unsupported RTP version {version}"),
        }
    }
}

impl From<ParseErrorKind> for StreamError {
    fn from(kind: ParseErrorKind) -> Self {
        StreamError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
