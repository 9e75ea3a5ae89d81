//! One outbound RTP stream: a worker thread owning a [`StreamDriver`],
//! fed through a bounded command queue.
//!
//! ```text
//! encoder ─▶ Stream::send_access_unit ─▶ queue ─▶ worker ─▶ StreamDriver ─▶ UDP
//! path monitor ─▶ Stream::path_changed ──────┘
//! ```
//!
//! Commands are processed strictly in arrival order, so stop, resume and
//! path changes always land between two access units.

pub mod config;
pub mod driver;
pub mod stats;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::error::{Result, StreamError};
use crate::media::h264::AccessUnit;
use crate::media::params::{ParameterSetCache, ParameterSets};
use crate::sdp::{self, SdpParams};
use crate::transport::{LinkState, PathStatus};

pub use config::StreamConfig;
pub use driver::StreamDriver;
pub use stats::{StatsSnapshot, StreamStats};

/// Work items for the stream worker.
#[derive(Debug)]
pub enum StreamCommand {
    AccessUnit(AccessUnit),
    PathChanged(PathStatus),
    Stop,
    Resume,
    /// Leave the worker loop. Sent by `Drop`.
    Shutdown,
}

/// Handle to a running stream.
///
/// Dropping the handle shuts the worker down and waits for it.
pub struct Stream {
    config: StreamConfig,
    ssrc: u32,
    commands: Sender<StreamCommand>,
    parameter_sets: ParameterSetCache,
    stats: Arc<StreamStats>,
    state: Arc<RwLock<LinkState>>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Validate `config`, resolve the destination, open the socket and
    /// spawn the worker.
    ///
    /// Configuration and name resolution errors are returned here, once;
    /// the worker never touches DNS. A socket that cannot be opened yet is
    /// not an error: the stream starts `Degraded` and retries on the next
    /// access unit.
    pub fn start(config: StreamConfig) -> Result<Self> {
        let parameter_sets = ParameterSetCache::new();
        let stats = Arc::new(StreamStats::new());
        let state = Arc::new(RwLock::new(LinkState::Uninitialized));

        let mut driver =
            StreamDriver::new(&config, parameter_sets.clone(), state.clone(), stats.clone())?;
        let ssrc = driver.ssrc();
        driver.connect();

        let (commands, queue) = crossbeam_channel::bounded(config.queue_capacity);
        let worker = thread::Builder::new()
            .name(format!("rtp-{}", config.name))
            .spawn(move || run_worker(driver, queue))?;

        tracing::info!(
            stream = %config.name,
            destination = %config.destination(),
            ssrc = format_args!("{:#010X}", ssrc),
            mtu = config.mtu,
            "stream started"
        );

        Ok(Self {
            config,
            ssrc,
            commands,
            parameter_sets,
            stats,
            state,
            worker: Some(worker),
        })
    }

    /// Queue an access unit for sending. Never blocks.
    ///
    /// When the queue is full the unit is dropped, counted, and
    /// [`StreamError::QueueFull`] is returned.
    pub fn send_access_unit(&self, unit: AccessUnit) -> Result<()> {
        match self.commands.try_send(StreamCommand::AccessUnit(unit)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.record_dropped_access_unit();
                tracing::warn!(stream = %self.config.name, "send queue full, access unit dropped");
                Err(StreamError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(StreamError::Disconnected),
        }
    }

    /// Replace the cached SPS/PPS, e.g. from an encoder format change.
    ///
    /// Takes effect on the next keyframe.
    pub fn update_parameter_sets(&self, sps: &[u8], pps: &[u8]) {
        self.parameter_sets.update(sps, pps);
    }

    pub fn parameter_sets(&self) -> Option<Arc<ParameterSets>> {
        self.parameter_sets.snapshot()
    }

    /// Forward a network path notification to the worker.
    pub fn path_changed(&self, status: PathStatus) -> Result<()> {
        self.command(StreamCommand::PathChanged(status))
    }

    /// Stop sending and release the socket. Queued units after this point
    /// are dropped until [`resume`](Self::resume).
    pub fn stop(&self) -> Result<()> {
        self.command(StreamCommand::Stop)
    }

    /// Reconnect after [`stop`](Self::stop), keeping sequence numbers,
    /// timestamps and SSRC.
    pub fn resume(&self) -> Result<()> {
        self.command(StreamCommand::Resume)
    }

    /// Control commands wait for queue space rather than being dropped.
    fn command(&self, command: StreamCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| StreamError::Disconnected)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn status(&self) -> LinkState {
        *self.state.read()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Session description a receiver needs to open this stream.
    ///
    /// Includes `sprop-parameter-sets` once SPS/PPS are known.
    pub fn sdp(&self, session_name: &str) -> String {
        let sets = self.parameter_sets.snapshot();
        sdp::generate_sdp(&SdpParams {
            session_name,
            session_id: self.ssrc as u64,
            host: &self.config.host,
            port: self.config.port,
            payload_type: self.config.payload_type,
            parameter_sets: sets.as_deref(),
        })
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!(stream = %self.config.name, "stream worker panicked");
        }
    }
}

fn run_worker(mut driver: StreamDriver, queue: Receiver<StreamCommand>) {
    for command in queue.iter() {
        match command {
            StreamCommand::AccessUnit(unit) => driver.handle_access_unit(&unit),
            StreamCommand::PathChanged(status) => driver.path_changed(status),
            StreamCommand::Stop => driver.stop(),
            StreamCommand::Resume => driver.resume(),
            StreamCommand::Shutdown => break,
        }
    }
    driver.stop();
    tracing::debug!(ssrc = format_args!("{:#010X}", driver.ssrc()), "stream worker exiting");
}
