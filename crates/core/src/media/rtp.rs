use crate::error::{ParseErrorKind, Result};

/// Size of the RTP fixed header without CSRCs or extensions.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP version carried in the top two bits of the first header byte.
pub const RTP_VERSION: u8 = 2;

/// Dynamic payload type conventionally used for H.264 (RFC 3551 §6).
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Generic RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Set on the last packet of a NAL unit (RFC 6184 §5.1).
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    /// Media clock, 90 kHz for H.264 video.
    pub timestamp: u32,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
}

impl RtpHeader {
    /// Serialize the 12-byte fixed header.
    pub fn write(&self) -> [u8; RTP_HEADER_LEN] {
        let first_byte: u8 = RTP_VERSION << 6;
        let second_byte: u8 = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);

        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }

    /// Decode a fixed header from the start of `buf`.
    ///
    /// CSRC lists and header extensions are not produced by this crate, so
    /// they are not interpreted here.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return Err(ParseErrorKind::ShortRtpHeader { len: buf.len() }.into());
        }
        let version = buf[0] >> 6;
        if version != RTP_VERSION {
            return Err(ParseErrorKind::BadRtpVersion { version }.into());
        }
        Ok(Self {
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7f,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// A fully formed RTP packet: fixed header plus codec payload.
///
/// Transient: built by [`RtpSession::build`], serialized, sent, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Size on the wire (header + payload).
    pub fn wire_len(&self) -> usize {
        RTP_HEADER_LEN + self.payload.len()
    }

    /// Serialize header and payload into one datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.wire_len());
        packet.extend_from_slice(&self.header.write());
        packet.extend_from_slice(&self.payload);
        packet
    }

    /// Split a received datagram back into header and payload.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = RtpHeader::parse(buf)?;
        Ok(Self {
            header,
            payload: buf[RTP_HEADER_LEN..].to_vec(),
        })
    }
}

/// Per-stream RTP session state.
///
/// Owns the counters that make one stream look continuous to a receiver:
/// - **Sequence number**: 16-bit, wrapping, incremented on every packet.
/// - **SSRC**: fixed for the lifetime of the session.
/// - **Timestamp**: the last value stamped on a packet.
///
/// One instance per stream; it is never shared between the stereo views.
#[derive(Debug)]
pub struct RtpSession {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpSession {
    /// Create a new session with explicit SSRC, starting at sequence 0.
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP session created"
        );
        Self {
            payload_type,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC.
    ///
    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(payload_type, rand::random::<u32>())
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Sequence number the next [`build`](Self::build) call will stamp.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp of the most recently built packet.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Wrap `payload` in an RTP header and advance the sequence number.
    ///
    /// The sequence number wraps at 65536 without error.
    pub fn build(&mut self, payload: Vec<u8>, timestamp: u32, marker: bool) -> RtpPacket {
        let header = RtpHeader {
            marker,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp,
            ssrc: self.ssrc,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = timestamp;
        RtpPacket { header, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> RtpSession {
        RtpSession::new(96, 0xAABBCCDD)
    }

    #[test]
    fn first_byte_is_0x80() {
        let mut s = make_session();
        let buf = s.build(vec![0x65], 0, false).to_bytes();
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn marker_bit() {
        let mut s = make_session();
        let no_marker = s.build(vec![], 0, false).to_bytes();
        assert_eq!(no_marker[1], 96);

        let with_marker = s.build(vec![], 0, true).to_bytes();
        assert_eq!(with_marker[1], 0x80 | 96);
    }

    #[test]
    fn sequence_increments() {
        let mut s = make_session();
        let b1 = s.build(vec![], 0, false).to_bytes();
        let seq1 = u16::from_be_bytes([b1[2], b1[3]]);
        let b2 = s.build(vec![], 0, false).to_bytes();
        let seq2 = u16::from_be_bytes([b2[2], b2[3]]);
        assert_eq!(seq2, seq1 + 1);
    }

    #[test]
    fn sequence_wraps() {
        let mut s = make_session();
        s.sequence = u16::MAX;
        let packet = s.build(vec![], 0, false);
        assert_eq!(packet.header.sequence, u16::MAX);
        assert_eq!(s.sequence(), 0);
        assert_eq!(s.build(vec![], 0, false).header.sequence, 0);
    }

    #[test]
    fn three_packets_share_ssrc() {
        let mut s = RtpSession::new(96, 0x12345678);
        let seqs: Vec<u16> = (0..3)
            .map(|_| {
                let buf = s.build(vec![0x41, 0x00], 3000, true).to_bytes();
                assert_eq!(&buf[8..12], &[0x12, 0x34, 0x56, 0x78]);
                u16::from_be_bytes([buf[2], buf[3]])
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn timestamp_written_big_endian() {
        let mut s = make_session();
        let buf = s.build(vec![], 0x01020304, false).to_bytes();
        assert_eq!(&buf[4..8], &[1, 2, 3, 4]);
        assert_eq!(s.timestamp(), 0x01020304);
    }

    #[test]
    fn header_fields_survive_parse() {
        let mut s = make_session();
        s.sequence = 0xFFFE;
        let packet = s.build(vec![0x67, 0x42], 0xDEADBEEF, true);
        let parsed = RtpPacket::parse(&packet.to_bytes()).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.header.sequence, 0xFFFE);
        assert_eq!(parsed.header.timestamp, 0xDEADBEEF);
        assert_eq!(parsed.header.ssrc, 0xAABBCCDD);
        assert!(parsed.header.marker);
    }

    #[test]
    fn parse_rejects_short_and_wrong_version() {
        assert!(RtpHeader::parse(&[0x80; 11]).is_err());
        let mut buf = [0u8; 12];
        buf[0] = 0x40;
        assert!(RtpHeader::parse(&buf).is_err());
    }

    #[test]
    fn random_ssrc_differs() {
        let s1 = RtpSession::with_random_ssrc(96);
        let s2 = RtpSession::with_random_ssrc(96);
        assert_ne!(s1.ssrc(), s2.ssrc());
    }
}
