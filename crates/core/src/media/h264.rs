use std::time::Duration;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::Packetizer;
use super::clock::H264_CLOCK_RATE;
use super::nal::{AvccReader, NalType, NalUnit, to_length_prefixed};
use super::params::{ParameterSetCache, ParameterSets};
use super::rtp::{RtpPacket, RtpSession};
use crate::error::{Result, StreamError};

pub const DEFAULT_MTU: usize = 1400;

/// NAL type value of a fragmentation unit A (RFC 6184 §5.8).
pub const FU_A_TYPE: u8 = 28;

/// Bytes of FU indicator + FU header in front of every fragment.
pub const FU_HEADER_LEN: usize = 2;

const FU_START_BIT: u8 = 0x80;
const FU_END_BIT: u8 = 0x40;

/// One encoder output event.
///
/// Holds the access unit in 4-byte length-prefixed form, exactly as a
/// hardware encoder hands it over, plus the sync-frame flag, an optional
/// presentation time and, on keyframes, the encoder's current parameter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    data: Vec<u8>,
    keyframe: bool,
    pts: Option<Duration>,
    parameter_sets: Option<ParameterSets>,
}

impl AccessUnit {
    /// Wrap a length-prefixed buffer.
    pub fn new(data: Vec<u8>, keyframe: bool) -> Self {
        Self {
            data,
            keyframe,
            pts: None,
            parameter_sets: None,
        }
    }

    /// Build from individual NAL units (header byte included).
    pub fn from_nal_units<'a, I>(nal_units: I, keyframe: bool) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        Self::new(to_length_prefixed(nal_units), keyframe)
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Attach the encoder's format description (SPS/PPS).
    pub fn with_parameter_sets(mut self, sets: ParameterSets) -> Self {
        self.parameter_sets = Some(sets);
        self
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    pub fn parameter_sets(&self) -> Option<&ParameterSets> {
        self.parameter_sets.as_ref()
    }

    /// Raw length-prefixed bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Lazily walk the NAL units in order.
    pub fn nal_units(&self) -> AvccReader<'_> {
        AvccReader::new(&self.data)
    }

    /// SPS/PPS carried in-band, if both are present.
    fn inband_parameter_sets(&self) -> Option<ParameterSets> {
        let mut sps = None;
        let mut pps = None;
        for nal in self.nal_units() {
            match nal.nal_type() {
                NalType::Sps if sps.is_none() => sps = Some(nal.data()),
                NalType::Pps if pps.is_none() => pps = Some(nal.data()),
                _ => {}
            }
        }
        Some(ParameterSets::new(sps?, pps?))
    }
}

/// Payload of one RTP packet produced from a NAL unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub payload: Vec<u8>,
    /// Last packet of the NAL unit.
    pub marker: bool,
}

/// Iterator over the RTP payloads of one NAL unit (RFC 6184).
///
/// A NAL unit no longer than the MTU comes out unchanged as a single NAL
/// unit payload (§5.6). A longer one is cut into FU-A payloads (§5.8),
/// each at most `mtu` bytes:
///
/// ```text
/// byte 0   FU indicator   F | NRI | 28
/// byte 1   FU header      S | E | 0 | type
/// byte 2.. slice of the NAL body, header byte excluded
/// ```
///
/// `S` marks the first payload and `E` the last; only the last one asks
/// for the RTP marker bit. A receiver rebuilds the header byte from the
/// indicator's F/NRI bits and the FU header's type.
#[derive(Debug, Clone)]
pub struct Fragmenter<'a> {
    nal: NalUnit<'a>,
    mtu: usize,
    offset: usize,
    done: bool,
}

impl<'a> Fragmenter<'a> {
    /// `mtu` must be greater than [`FU_HEADER_LEN`]; stream setup rejects
    /// smaller values.
    pub fn new(nal: NalUnit<'a>, mtu: usize) -> Self {
        debug_assert!(mtu > FU_HEADER_LEN, "MTU too small for FU-A");
        Self {
            nal,
            mtu,
            offset: 0,
            done: false,
        }
    }

    /// Whether the NAL unit needs FU-A (a 1-byte NAL never does).
    pub fn is_fragmented(&self) -> bool {
        self.nal.len() > self.mtu
    }
}

impl Iterator for Fragmenter<'_> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        if self.done {
            return None;
        }

        if !self.is_fragmented() {
            self.done = true;
            return Some(Fragment {
                payload: self.nal.data().to_vec(),
                marker: true,
            });
        }

        let header = self.nal.header();
        let body = self.nal.body();
        let max_fragment = self.mtu - FU_HEADER_LEN;
        let end = std::cmp::min(self.offset + max_fragment, body.len());
        let chunk = &body[self.offset..end];

        let first = self.offset == 0;
        let last = end == body.len();

        // Indicator keeps F/NRI; the FU header carries the real type.
        let fu_indicator = (header & 0xe0) | FU_A_TYPE;
        let start_bit = if first { FU_START_BIT } else { 0x00 };
        let end_bit = if last { FU_END_BIT } else { 0x00 };
        let fu_header = start_bit | end_bit | (header & 0x1f);

        let mut payload = Vec::with_capacity(FU_HEADER_LEN + chunk.len());
        payload.push(fu_indicator);
        payload.push(fu_header);
        payload.extend_from_slice(chunk);

        self.offset = end;
        self.done = last;

        Some(Fragment {
            payload,
            marker: last,
        })
    }
}

/// Number of RTP packets a NAL unit of `nal_len` bytes turns into.
pub fn packet_count(nal_len: usize, mtu: usize) -> usize {
    if nal_len <= mtu {
        1
    } else {
        (nal_len - 1).div_ceil(mtu - FU_HEADER_LEN)
    }
}

/// H.264 RTP packetizer (RFC 6184, packetization-mode=1).
///
/// Turns access units into RTP packets for one stream:
///
/// 1. On a keyframe, the encoder's parameter sets refresh the cache and the
///    cached SPS then PPS are sent as single NAL unit packets, so a receiver
///    joining late or recovering from loss can start decoding.
/// 2. Every NAL unit of the access unit follows, in order, through the
///    [`Fragmenter`].
///
/// All packets of one access unit carry the same timestamp.
///
/// ## Marker bit
///
/// The marker is set on every single NAL unit packet and on the last
/// fragment of every FU-A run.
///
/// ## SDP attributes (RFC 6184 §8.1)
///
/// - `a=rtpmap:96 H264/90000`
/// - `a=fmtp:96 packetization-mode=1[;profile-level-id=...][;sprop-parameter-sets=...]`
#[derive(Debug)]
pub struct H264Packetizer {
    session: RtpSession,
    mtu: usize,
    parameter_sets: ParameterSetCache,
    /// Injected SPS/PPS packets at the head of the last packetized unit.
    injected: usize,
}

impl H264Packetizer {
    /// Create with explicit payload type and SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self::from_session(RtpSession::new(pt, ssrc))
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::from_session(RtpSession::with_random_ssrc(pt))
    }

    fn from_session(session: RtpSession) -> Self {
        Self {
            session,
            mtu: DEFAULT_MTU,
            parameter_sets: ParameterSetCache::new(),
            injected: 0,
        }
    }

    /// Override the fragmentation threshold.
    pub fn with_mtu(mut self, mtu: usize) -> Result<Self> {
        if mtu <= FU_HEADER_LEN {
            return Err(StreamError::InvalidConfig(format!(
                "mtu {mtu} leaves no room for FU-A fragment data"
            )));
        }
        self.mtu = mtu;
        Ok(self)
    }

    /// Share a parameter-set cache with an external producer.
    pub fn with_parameter_sets(mut self, cache: ParameterSetCache) -> Self {
        self.parameter_sets = cache;
        self
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn parameter_sets(&self) -> &ParameterSetCache {
        &self.parameter_sets
    }

    /// How many packets at the start of the last [`packetize`] result are
    /// cached SPS/PPS sent ahead of a keyframe. In-band parameter sets
    /// inside the access unit are not included.
    ///
    /// [`packetize`]: Packetizer::packetize
    pub fn injected_packets(&self) -> usize {
        self.injected
    }

    /// Packetize a single NAL unit into one or more RTP packets.
    fn packetize_nal(&mut self, nal: NalUnit<'_>, timestamp: u32, packets: &mut Vec<RtpPacket>) {
        let fragmenter = Fragmenter::new(nal, self.mtu);
        let fragmented = fragmenter.is_fragmented();
        let before = packets.len();

        for fragment in fragmenter {
            packets.push(self.session.build(fragment.payload, timestamp, fragment.marker));
        }

        if fragmented {
            tracing::trace!(
                nal_type = nal.nal_type().as_u8(),
                nal_size = nal.len(),
                fragments = packets.len() - before,
                "FU-A fragmented NAL unit"
            );
        }
    }

    /// Refresh the cache from a keyframe's format description, falling back
    /// to SPS/PPS carried inside the access unit.
    fn refresh_parameter_sets(&self, unit: &AccessUnit) {
        if let Some(sets) = unit.parameter_sets() {
            self.parameter_sets.replace(sets.clone());
        } else if let Some(sets) = unit.inband_parameter_sets() {
            if self.parameter_sets.replace(sets) {
                tracing::debug!("H.264 SPS/PPS captured from bitstream");
            }
        }
    }

    fn inject_parameter_sets(&mut self, timestamp: u32, packets: &mut Vec<RtpPacket>) {
        let Some(sets) = self.parameter_sets.snapshot() else {
            tracing::warn!(
                ssrc = format_args!("{:#010X}", self.session.ssrc()),
                "keyframe without parameter sets, not sending SPS/PPS"
            );
            return;
        };

        for (name, bytes) in [("SPS", &sets.sps), ("PPS", &sets.pps)] {
            match NalUnit::new(bytes) {
                Some(nal) => {
                    tracing::trace!(
                        len = bytes.len(),
                        head = %hex_prefix(bytes),
                        "sending {name}"
                    );
                    self.packetize_nal(nal, timestamp, packets);
                }
                None => tracing::warn!("empty {name} in parameter set cache, skipped"),
            }
        }
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, unit: &AccessUnit, timestamp: u32) -> Vec<RtpPacket> {
        let mut packets = Vec::new();

        if unit.is_keyframe() {
            self.refresh_parameter_sets(unit);
            self.inject_parameter_sets(timestamp, &mut packets);
        }
        self.injected = packets.len();

        let mut nal_count = 0usize;
        for nal in unit.nal_units() {
            self.packetize_nal(nal, timestamp, &mut packets);
            nal_count += 1;
        }

        tracing::trace!(
            nal_count,
            rtp_packets = packets.len(),
            keyframe = unit.is_keyframe(),
            frame_bytes = unit.data().len(),
            seq = self.session.sequence(),
            ts = timestamp,
            "frame packetized"
        );

        packets
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    /// 90 kHz clock rate per RFC 6184 §8.1.
    fn clock_rate(&self) -> u32 {
        H264_CLOCK_RATE
    }

    fn payload_type(&self) -> u8 {
        self.session.payload_type()
    }

    fn sdp_attributes(&self) -> Vec<String> {
        sdp_attributes(
            self.payload_type(),
            self.parameter_sets.snapshot().as_deref(),
        )
    }

    fn next_sequence(&self) -> u16 {
        self.session.sequence()
    }

    fn ssrc(&self) -> u32 {
        self.session.ssrc()
    }
}

/// SDP media attributes for an H.264 stream (RFC 6184 §8.2.1).
///
/// Order matters: `a=rtpmap` defines the payload type and must precede
/// `a=fmtp`, which references it. ffplay and other clients parse attributes
/// sequentially.
///
/// - `a=rtpmap:<pt> H264/90000`: codec name and clock rate
/// - `a=fmtp:<pt> packetization-mode=1[;profile-level-id=...][;sprop-parameter-sets=...]`
pub fn sdp_attributes(payload_type: u8, sets: Option<&ParameterSets>) -> Vec<String> {
    let mut fmtp = format!("a=fmtp:{} packetization-mode=1", payload_type);
    if let Some(sets) = sets {
        if let Some(pl) = sets.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={}", pl));
        }
        fmtp.push_str(&format!(
            ";sprop-parameter-sets={},{}",
            BASE64_STANDARD.encode(&sets.sps),
            BASE64_STANDARD.encode(&sets.pps)
        ));
    }

    vec![
        format!("a=rtpmap:{} H264/{}", payload_type, H264_CLOCK_RATE),
        fmtp,
    ]
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(10).map(|b| format!("{b:02X}")).collect()
}
