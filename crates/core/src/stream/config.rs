use crate::error::{Result, StreamError};
use crate::media::clock::TimestampMode;
use crate::media::h264::{DEFAULT_MTU, FU_HEADER_LEN};
use crate::media::rtp::{DEFAULT_PAYLOAD_TYPE, RTP_HEADER_LEN};

/// Nominal capture rate used for fixed-rate timestamps and fallbacks.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Access units buffered between the encoder and the stream worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Destination port of the first (left) stream.
pub const DEFAULT_PORT: u16 = 5004;

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Configuration for a single outbound RTP stream.
///
/// Destination, packetization and pacing parameters. Defaults match a
/// typical receiver setup: H.264 on payload type 96, 1400-byte MTU,
/// presentation-time timestamps.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Label used in logs and worker thread names (e.g. `"left"`).
    pub name: String,
    /// Destination host name or IP address.
    pub host: String,
    /// Destination UDP port.
    pub port: u16,
    /// Largest RTP payload before FU-A fragmentation kicks in.
    pub mtu: usize,
    /// RTP payload type (dynamic range 96–127).
    pub payload_type: u8,
    /// Fixed SSRC; `None` picks a random one when the stream starts.
    pub ssrc: Option<u32>,
    pub timestamp_mode: TimestampMode,
    /// Frames per second, for fixed-rate timestamps and missing PTS.
    pub frame_rate: u32,
    /// Depth of the access-unit queue feeding the worker.
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "stream".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            mtu: DEFAULT_MTU,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: None,
            timestamp_mode: TimestampMode::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Default configuration aimed at `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` for logs and session descriptions.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that cannot produce valid packets.
    ///
    /// Called once by [`Stream::start`](crate::Stream::start) so a bad
    /// setting fails the setup instead of every packet.
    pub fn validate(&self) -> Result<()> {
        if self.mtu <= FU_HEADER_LEN {
            return Err(StreamError::InvalidConfig(format!(
                "mtu {} leaves no room for FU-A fragment data (must be > {FU_HEADER_LEN})",
                self.mtu
            )));
        }
        if self.mtu + RTP_HEADER_LEN > MAX_UDP_PAYLOAD {
            return Err(StreamError::InvalidConfig(format!(
                "mtu {} exceeds the largest UDP payload",
                self.mtu
            )));
        }
        if self.payload_type > 127 {
            return Err(StreamError::InvalidConfig(format!(
                "payload type {} does not fit in 7 bits",
                self.payload_type
            )));
        }
        if self.frame_rate == 0 {
            return Err(StreamError::InvalidConfig("frame rate must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "queue capacity must be non-zero".into(),
            ));
        }
        if self.host.is_empty() {
            return Err(StreamError::InvalidConfig("destination host is empty".into()));
        }
        Ok(())
    }
}
