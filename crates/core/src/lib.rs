//! H.264 over RTP/UDP sender.
//!
//! Takes encoder access units (4-byte length-prefixed NAL units), emits
//! SPS/PPS ahead of every keyframe, fragments large NAL units with FU-A
//! (RFC 6184) and sends RTP packets (RFC 3550) to a fixed destination.
//! A [`StereoStreamer`] runs two independent streams for left/right views.
//!
//! ```no_run
//! use streamer::{AccessUnit, Stream, StreamConfig};
//!
//! # fn main() -> streamer::Result<()> {
//! let stream = Stream::start(StreamConfig::new("192.168.1.20", 5004))?;
//! stream.update_parameter_sets(&[0x67, 0x42, 0x00, 0x1E], &[0x68, 0xCE, 0x38, 0x80]);
//!
//! let idr: &[u8] = &[0x65, 0x88, 0x84];
//! stream.send_access_unit(AccessUnit::from_nal_units([idr], true))?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod media;
pub mod sdp;
pub mod stereo;
pub mod stream;
pub mod transport;

pub use error::{ParseErrorKind, Result, StreamError};
pub use media::Packetizer;
pub use media::clock::TimestampMode;
pub use media::h264::{AccessUnit, H264Packetizer};
pub use media::params::ParameterSets;
pub use stereo::{Eye, StereoConfig, StereoStreamer};
pub use stream::{StatsSnapshot, Stream, StreamConfig};
pub use transport::{LinkState, PathStatus};
