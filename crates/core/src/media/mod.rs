//! H.264 parsing and RTP packetization.
//!
//! This module provides the [`Packetizer`] trait and the H.264
//! implementation that converts encoder access units into RTP packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame is split into one or more RTP packets.
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video ([`clock`]).
//! - **SSRC** (32-bit): identifies the sender for the whole session.
//! - **Marker bit**: set on the last packet of a NAL unit.
//!
//! ## Pipeline
//!
//! ```text
//! AccessUnit ─▶ nal::AvccReader ─▶ (params cache on keyframe) ─▶ h264::Fragmenter ─▶ rtp::RtpSession
//! ```

pub mod clock;
pub mod h264;
pub mod nal;
pub mod params;
pub mod rtp;

use h264::AccessUnit;
use rtp::RtpPacket;

/// Codec-specific RTP packetizer.
///
/// Provides:
/// - **Packetization**: splitting an access unit into RTP-sized packets
/// - **SDP attributes**: codec parameters a receiver needs out-of-band
/// - **RTP metadata**: payload type, clock rate, sequence/SSRC state
///
/// The generic RTP header is handled by [`rtp::RtpSession`]; packetizers
/// compose it rather than reimplementing header serialization.
pub trait Packetizer: Send {
    /// Packetize one access unit into RTP packets, in send order.
    ///
    /// Every returned packet carries `timestamp` (90 kHz units for video).
    fn packetize(&mut self, unit: &AccessUnit, timestamp: u32) -> Vec<RtpPacket>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    ///
    /// Dynamic types use 96–127. H.264 conventionally uses 96.
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines, `a=` prefix included.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Sequence number of the next packet.
    fn next_sequence(&self) -> u16;

    /// Synchronization source of this stream.
    fn ssrc(&self) -> u32;
}
