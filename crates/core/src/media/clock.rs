use std::time::Duration;

/// RTP clock rate for H.264 video (RFC 6184 §8.2.1).
pub const H264_CLOCK_RATE: u32 = 90_000;

/// How access-unit timestamps are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// `round(pts_seconds * 90000)`, truncated to 32 bits.
    ///
    /// Follows the real capture pacing, so dropped or late frames keep the
    /// receiver's playout clock correct. Units without a presentation time
    /// fall back to the fixed increment.
    #[default]
    PresentationTime,
    /// `90000 / frame_rate` per access unit, starting at 0.
    FixedRate,
}

/// Convert a presentation time to 90 kHz ticks, rounded to nearest.
///
/// The result wraps modulo 2^32 as RTP timestamps do.
pub fn pts_to_rtp(pts: Duration) -> u32 {
    let ticks = (pts.as_nanos() * H264_CLOCK_RATE as u128 + 500_000_000) / 1_000_000_000;
    ticks as u32
}

/// Maps access units to 90 kHz RTP timestamps for one stream.
///
/// Output never goes backwards (RFC 3550 serial-number comparison): a
/// presentation time behind the previous unit is clamped to the previous
/// timestamp.
#[derive(Debug)]
pub struct RtpClock {
    mode: TimestampMode,
    increment: u32,
    last: Option<u32>,
}

impl RtpClock {
    pub fn new(mode: TimestampMode, frame_rate: u32) -> Self {
        Self {
            mode,
            increment: H264_CLOCK_RATE / frame_rate.max(1),
            last: None,
        }
    }

    /// Ticks per access unit at the configured frame rate.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Timestamp of the previous access unit.
    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// Timestamp for the next access unit.
    pub fn next_timestamp(&mut self, pts: Option<Duration>) -> u32 {
        let candidate = match (self.mode, pts, self.last) {
            (TimestampMode::PresentationTime, Some(pts), _) => pts_to_rtp(pts),
            (_, _, Some(last)) => last.wrapping_add(self.increment),
            (_, _, None) => 0,
        };

        let timestamp = match self.last {
            Some(last) if is_behind(candidate, last) => {
                tracing::debug!(candidate, last, "presentation time went backwards, clamping");
                last
            }
            _ => candidate,
        };

        self.last = Some(timestamp);
        timestamp
    }
}

fn is_behind(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
