use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::media::h264::FU_A_TYPE;
use crate::media::rtp::RtpPacket;

/// Live counters for one stream.
///
/// Written by the stream worker, read from any thread through
/// [`snapshot`](Self::snapshot). Relaxed ordering: each counter is
/// independent and only used for reporting.
#[derive(Debug, Default)]
pub struct StreamStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    fragmented_nal_units: AtomicU64,
    fragments_sent: AtomicU64,
    parameter_set_packets: AtomicU64,
    access_units: AtomicU64,
    access_units_dropped: AtomicU64,
    send_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a datagram that left the socket.
    pub(crate) fn record_sent(&self, packet: &RtpPacket, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);

        let Some(&indicator) = packet.payload.first() else {
            return;
        };
        if indicator & 0x1f == FU_A_TYPE {
            self.fragments_sent.fetch_add(1, Ordering::Relaxed);
            if packet.payload.get(1).is_some_and(|h| h & 0x80 != 0) {
                self.fragmented_nal_units.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Count a cached SPS or PPS sent ahead of a keyframe.
    pub(crate) fn record_parameter_set_packet(&self) {
        self.parameter_set_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_access_unit(&self) {
        self.access_units.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_access_unit(&self) {
        self.access_units_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            fragmented_nal_units: self.fragmented_nal_units.load(Ordering::Relaxed),
            fragments_sent: self.fragments_sent.load(Ordering::Relaxed),
            parameter_set_packets: self.parameter_set_packets.load(Ordering::Relaxed),
            access_units: self.access_units.load(Ordering::Relaxed),
            access_units_dropped: self.access_units_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Datagrams handed to the socket successfully.
    pub packets_sent: u64,
    /// Wire bytes of those datagrams, RTP header included.
    pub bytes_sent: u64,
    /// NAL units that needed FU-A.
    pub fragmented_nal_units: u64,
    /// FU-A packets sent.
    pub fragments_sent: u64,
    /// Cached SPS and PPS packets sent ahead of keyframes. Parameter sets
    /// carried inside an access unit count as ordinary packets.
    pub parameter_set_packets: u64,
    /// Access units packetized.
    pub access_units: u64,
    /// Access units discarded (queue full, stream stopped or no socket).
    pub access_units_dropped: u64,
    /// Packets lost to socket errors or a missing socket.
    pub send_errors: u64,
    /// Sockets re-created after a path change or failure.
    pub reconnects: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} access units ({} dropped), {} packets / {} bytes sent, \
             {} FU-A fragments from {} NAL units, {} parameter set packets, \
             {} send errors, {} reconnects",
            self.access_units,
            self.access_units_dropped,
            self.packets_sent,
            self.bytes_sent,
            self.fragments_sent,
            self.fragmented_nal_units,
            self.parameter_set_packets,
            self.send_errors,
            self.reconnects
        )
    }
}
