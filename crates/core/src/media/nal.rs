//! H.264 NAL unit extraction.
//!
//! Encoders hand over access units in the "AVCC" layout: every NAL unit is
//! preceded by a 4-byte big-endian length instead of an Annex B start code.
//!
//! ```text
//! +--------+-----------------+--------+-----------------+
//! | len BE |  NAL (len bytes) | len BE |  NAL (len bytes) | ...
//! +--------+-----------------+--------+-----------------+
//! ```
//!
//! [`AvccReader`] walks that layout with a bounds-checked cursor. The Annex B
//! helpers at the bottom convert raw elementary streams (e.g. `.h264` files)
//! into the same layout, so a file can stand in for a live encoder.

use crate::error::{ParseErrorKind, Result};

/// Size of the big-endian length prefix in front of each NAL unit.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// H.264 NAL unit type (ITU-T H.264 Table 7-1), low 5 bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    NonIdrSlice,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    /// Fragmentation unit A (RFC 6184 §5.8), only seen on the wire.
    FuA,
    Other(u8),
}

impl NalType {
    /// Type carried in a NAL header byte.
    pub fn from_header(header: u8) -> Self {
        match header & 0x1f {
            1 => Self::NonIdrSlice,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            28 => Self::FuA,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::NonIdrSlice => 1,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::AccessUnitDelimiter => 9,
            Self::FuA => 28,
            Self::Other(t) => t,
        }
    }

    /// Coded slice types 1..=5 carry picture data.
    pub fn is_vcl(self) -> bool {
        (1..=5).contains(&self.as_u8())
    }
}

/// One NAL unit, header byte included.
///
/// Always non-empty, and `nal_type` always matches the low 5 bits of the
/// first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    nal_type: NalType,
    data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// Wrap raw NAL bytes. Returns `None` for an empty slice.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        let header = *data.first()?;
        Some(Self {
            nal_type: NalType::from_header(header),
            data,
        })
    }

    pub fn nal_type(&self) -> NalType {
        self.nal_type
    }

    /// First byte: `F(1) | NRI(2) | Type(5)`.
    pub fn header(&self) -> u8 {
        self.data[0]
    }

    /// Full NAL bytes including the header.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// NAL bytes after the 1-byte header.
    pub fn body(&self) -> &'a [u8] {
        &self.data[1..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bounds-checked cursor over a length-prefixed access unit.
///
/// Single pass and lazy: each [`read_nal`](Self::read_nal) call consumes one
/// entry. Zero-length entries are skipped. A length prefix that runs past
/// the end of the buffer is reported as a [`ParseErrorKind`] and ends the
/// access unit.
#[derive(Debug, Clone)]
pub struct AvccReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AvccReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read the next NAL unit.
    ///
    /// `Ok(None)` marks a clean end of buffer. After an error the reader is
    /// exhausted.
    pub fn read_nal(&mut self) -> Result<Option<NalUnit<'a>>> {
        loop {
            let remaining = self.remaining();
            if remaining == 0 {
                return Ok(None);
            }
            if remaining < LENGTH_PREFIX_LEN {
                self.pos = self.buf.len();
                return Err(ParseErrorKind::TruncatedLength { remaining }.into());
            }

            let prefix = &self.buf[self.pos..self.pos + LENGTH_PREFIX_LEN];
            let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            self.pos += LENGTH_PREFIX_LEN;

            let remaining = self.remaining();
            if declared > remaining {
                self.pos = self.buf.len();
                return Err(ParseErrorKind::TruncatedNal {
                    declared,
                    remaining,
                }
                .into());
            }

            let data = &self.buf[self.pos..self.pos + declared];
            self.pos += declared;

            match NalUnit::new(data) {
                Some(nal) => return Ok(Some(nal)),
                None => tracing::trace!(offset = self.pos, "skipping zero-length NAL unit"),
            }
        }
    }
}

impl<'a> Iterator for AvccReader<'a> {
    type Item = NalUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_nal() {
            Ok(nal) => nal,
            Err(e) => {
                tracing::debug!(error = %e, "access unit truncated, ignoring the rest");
                None
            }
        }
    }
}

/// Split an Annex B byte stream into NAL units.
///
/// A NAL unit starts after every `00 00 01` prefix and runs up to the next
/// one. Zero bytes in front of a prefix (the leading byte of a 4-byte start
/// code, `trailing_zero_8bits`) belong to the separator, never to the NAL
/// unit. Bytes before the first prefix and empty units are discarded.
pub fn extract_annexb_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut nal_units = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = 0;

    while let Some(offset) = data[pos..].windows(3).position(|w| w == [0, 0, 1]) {
        let prefix = pos + offset;
        if let Some(start) = current {
            push_trimmed(&mut nal_units, &data[start..prefix]);
        }
        pos = prefix + 3;
        current = Some(pos);
    }
    if let Some(start) = current {
        push_trimmed(&mut nal_units, &data[start..]);
    }

    nal_units
}

fn push_trimmed<'a>(nal_units: &mut Vec<&'a [u8]>, nal: &'a [u8]) {
    let len = nal.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    if len > 0 {
        nal_units.push(&nal[..len]);
    }
}

/// Re-encode NAL units with 4-byte big-endian length prefixes.
///
/// Empty slices are dropped.
pub fn to_length_prefixed<'a, I>(nal_units: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = Vec::new();
    for nal in nal_units.into_iter().filter(|n| !n.is_empty()) {
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Group a NAL unit sequence into access units (ITU-T H.264 §7.4.1.2.3).
///
/// Once the current access unit holds a coded slice, a new one begins at an
/// access unit delimiter, SEI, SPS or PPS, or at a slice whose
/// `first_mb_in_slice` is 0.
pub fn split_access_units<'a>(nal_units: &[&'a [u8]]) -> Vec<Vec<&'a [u8]>> {
    let mut units = Vec::new();
    let mut current: Vec<&'a [u8]> = Vec::new();
    let mut has_vcl = false;

    for &data in nal_units {
        let Some(nal) = NalUnit::new(data) else {
            continue;
        };
        let nal_type = nal.nal_type();

        let starts_new = has_vcl
            && match nal_type {
                NalType::AccessUnitDelimiter | NalType::Sei | NalType::Sps | NalType::Pps => true,
                // first_mb_in_slice is ue(v); a value of 0 encodes as a single `1` bit.
                t if t.is_vcl() => nal.body().first().is_some_and(|b| b & 0x80 != 0),
                _ => false,
            };

        if starts_new {
            units.push(std::mem::take(&mut current));
            has_vcl = false;
        }

        has_vcl |= nal_type.is_vcl();
        current.push(data);
    }

    if !current.is_empty() {
        units.push(current);
    }
    units
}
