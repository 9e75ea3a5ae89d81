use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use super::config::StreamConfig;
use super::stats::StreamStats;
use crate::error::{Result, StreamError};
use crate::media::Packetizer;
use crate::media::clock::RtpClock;
use crate::media::h264::{AccessUnit, H264Packetizer};
use crate::media::params::ParameterSetCache;
use crate::media::rtp::RtpPacket;
use crate::transport::{LinkState, PathStatus, UdpTransport};

/// Owns all mutable state of one stream and turns access units into
/// datagrams.
///
/// Only the stream worker calls into the driver, one command at a time, so
/// sequence numbers and timestamps never see concurrent writers. The
/// driver never returns transport errors to its caller: they are logged,
/// counted and the packet is dropped.
///
/// The destination is resolved once, in [`new`](Self::new). Reconnecting
/// only binds and connects a fresh socket, so it never stalls the worker.
pub struct StreamDriver {
    name: String,
    peer: SocketAddr,
    packetizer: H264Packetizer,
    clock: RtpClock,
    transport: Option<UdpTransport>,
    state: Arc<RwLock<LinkState>>,
    stats: Arc<StreamStats>,
    /// Cleared by `PathStatus::Unsatisfied`; no reconnects until the path
    /// comes back.
    path_available: bool,
    /// Set after the first failed send of an outage, to log it only once.
    send_failing: bool,
}

impl StreamDriver {
    /// Validate `config` and resolve its destination. Does not open a
    /// socket; call [`connect`](Self::connect) for that.
    pub fn new(
        config: &StreamConfig,
        parameter_sets: ParameterSetCache,
        state: Arc<RwLock<LinkState>>,
        stats: Arc<StreamStats>,
    ) -> Result<Self> {
        config.validate()?;
        let peer = UdpTransport::resolve(&config.host, config.port)?;

        let packetizer = match config.ssrc {
            Some(ssrc) => H264Packetizer::new(config.payload_type, ssrc),
            None => H264Packetizer::with_random_ssrc(config.payload_type),
        }
        .with_mtu(config.mtu)?
        .with_parameter_sets(parameter_sets);

        Ok(Self {
            name: config.name.clone(),
            peer,
            packetizer,
            clock: RtpClock::new(config.timestamp_mode, config.frame_rate),
            transport: None,
            state,
            stats,
            path_available: true,
            send_failing: false,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn set_state(&self, state: LinkState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::debug!(stream = %self.name, old_state = %*current, new_state = %state, "state transition");
            *current = state;
        }
    }

    /// Open a fresh socket towards the destination.
    ///
    /// On failure the stream is left `Degraded` and the next access unit
    /// retries. Sequence number, timestamp and SSRC are untouched either way.
    pub fn connect(&mut self) -> bool {
        self.set_state(LinkState::Connecting);
        self.transport = None;

        match UdpTransport::connect(self.peer) {
            Ok(transport) => {
                tracing::info!(
                    stream = %self.name,
                    peer = %transport.peer(),
                    ssrc = format_args!("{:#010X}", self.ssrc()),
                    "stream ready"
                );
                self.transport = Some(transport);
                self.send_failing = false;
                self.set_state(LinkState::Ready);
                true
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.name,
                    peer = %self.peer,
                    error = %e,
                    "failed to open UDP socket, will retry"
                );
                self.set_state(LinkState::Degraded);
                false
            }
        }
    }

    /// Packetize and send one access unit.
    ///
    /// Without a socket the unit is dropped before packetization, so the
    /// receiver sees no sequence gap. A failed connect is retried here; a
    /// lost path is not, it waits for `PathStatus::Satisfied`.
    pub fn handle_access_unit(&mut self, unit: &AccessUnit) {
        if self.state() == LinkState::Stopped {
            self.stats.record_dropped_access_unit();
            tracing::trace!(stream = %self.name, "stream stopped, access unit dropped");
            return;
        }

        let timestamp = self.clock.next_timestamp(unit.pts());

        if self.transport.is_none() && self.path_available && self.connect() {
            self.stats.record_reconnect();
        }
        if self.transport.is_none() {
            self.stats.record_dropped_access_unit();
            tracing::trace!(stream = %self.name, state = %self.state(), "no socket, access unit dropped");
            return;
        }

        let packets = self.packetizer.packetize(unit, timestamp);
        let injected = self.packetizer.injected_packets();
        for (index, packet) in packets.iter().enumerate() {
            if self.send(packet) && index < injected {
                self.stats.record_parameter_set_packet();
            }
        }
        self.stats.record_access_unit();
    }

    /// The single place a send result is inspected.
    ///
    /// RTP is fire-and-forget: failures are logged and counted, and the
    /// packet is dropped. Returns whether the datagram left the socket.
    fn send(&mut self, packet: &RtpPacket) -> bool {
        let datagram = packet.to_bytes();
        let result = match &self.transport {
            Some(transport) => transport.send(&datagram),
            None => Err(StreamError::NotConnected),
        };

        match result {
            Ok(bytes) => {
                if self.send_failing {
                    tracing::info!(stream = %self.name, seq = packet.header.sequence, "sends recovered");
                    self.send_failing = false;
                }
                self.stats.record_sent(packet, bytes);
                tracing::trace!(
                    stream = %self.name,
                    seq = packet.header.sequence,
                    ts = packet.header.timestamp,
                    marker = packet.header.marker,
                    bytes,
                    "packet sent"
                );
                true
            }
            Err(e) => {
                self.stats.record_send_error();
                let would_block =
                    matches!(&e, StreamError::Io(io) if io.kind() == io::ErrorKind::WouldBlock);
                if would_block {
                    tracing::debug!(stream = %self.name, seq = packet.header.sequence, "send buffer full, packet dropped");
                } else if !self.send_failing {
                    tracing::warn!(stream = %self.name, seq = packet.header.sequence, error = %e, "send failed, dropping packets");
                    self.send_failing = true;
                }
                false
            }
        }
    }

    /// React to a network path change.
    ///
    /// Losing the path releases the socket; regaining it opens a new one.
    /// RTP counters carry over so the receiver sees one continuous session.
    pub fn path_changed(&mut self, status: PathStatus) {
        let state = self.state();
        if state == LinkState::Stopped {
            tracing::debug!(stream = %self.name, ?status, "path change ignored while stopped");
            return;
        }

        match status {
            PathStatus::Unsatisfied => {
                tracing::warn!(stream = %self.name, "network path lost");
                self.path_available = false;
                self.transport = None;
                self.set_state(LinkState::Degraded);
            }
            PathStatus::Satisfied => {
                tracing::info!(stream = %self.name, "network path available, reconnecting");
                self.path_available = true;
                if self.connect() {
                    self.stats.record_reconnect();
                }
            }
        }
    }

    /// Stop sending and release the socket. Counters are kept.
    pub fn stop(&mut self) {
        if self.state() == LinkState::Stopped {
            return;
        }
        self.transport = None;
        self.set_state(LinkState::Stopped);
        tracing::info!(
            stream = %self.name,
            next_seq = self.packetizer.next_sequence(),
            "stream stopped"
        );
    }

    /// Restart after [`stop`](Self::stop) with a fresh connect cycle.
    pub fn resume(&mut self) {
        if self.state() != LinkState::Stopped {
            return;
        }
        tracing::info!(stream = %self.name, next_seq = self.packetizer.next_sequence(), "stream resuming");
        self.path_available = true;
        self.connect();
    }
}
