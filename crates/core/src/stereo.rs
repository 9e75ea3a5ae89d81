//! Left/right stereo pair: two fully independent [`Stream`]s.
//!
//! Each eye has its own destination port, worker thread, sequence
//! numbers, timestamps and counters. Nothing mutable is shared, so a
//! stall or reconnect on one eye never affects the other.

use std::fmt;

use crate::error::Result;
use crate::media::h264::AccessUnit;
use crate::stream::{StatsSnapshot, Stream, StreamConfig};
use crate::transport::PathStatus;

pub const DEFAULT_LEFT_PORT: u16 = 5004;
pub const DEFAULT_RIGHT_PORT: u16 = 5006;

/// Destination and shared stream parameters for a stereo pair.
#[derive(Debug, Clone)]
pub struct StereoConfig {
    pub host: String,
    pub left_port: u16,
    pub right_port: u16,
    /// Template for both streams. `name`, `host` and `port` are overridden
    /// per eye.
    pub stream: StreamConfig,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            left_port: DEFAULT_LEFT_PORT,
            right_port: DEFAULT_RIGHT_PORT,
            stream: StreamConfig::default(),
        }
    }
}

impl StereoConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// Configuration of one eye's stream.
    pub fn eye(&self, eye: Eye) -> StreamConfig {
        let port = match eye {
            Eye::Left => self.left_port,
            Eye::Right => self.right_port,
        };
        StreamConfig {
            name: eye.to_string(),
            host: self.host.clone(),
            port,
            ..self.stream.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

pub struct StereoStreamer {
    left: Stream,
    right: Stream,
}

impl StereoStreamer {
    /// Start both streams. Fails if either configuration is invalid or the
    /// host does not resolve.
    pub fn start(config: &StereoConfig) -> Result<Self> {
        if config.left_port == config.right_port {
            tracing::warn!(
                port = config.left_port,
                "left and right streams share a destination port"
            );
        }
        let left = Stream::start(config.eye(Eye::Left))?;
        let right = Stream::start(config.eye(Eye::Right))?;
        Ok(Self { left, right })
    }

    pub fn stream(&self, eye: Eye) -> &Stream {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    pub fn left(&self) -> &Stream {
        &self.left
    }

    pub fn right(&self) -> &Stream {
        &self.right
    }

    /// Queue an access unit on one eye.
    pub fn send(&self, eye: Eye, unit: AccessUnit) -> Result<()> {
        self.stream(eye).send_access_unit(unit)
    }

    /// Path changes affect both eyes; both are notified even if one fails.
    pub fn path_changed(&self, status: PathStatus) -> Result<()> {
        let left = self.left.path_changed(status);
        let right = self.right.path_changed(status);
        left.and(right)
    }

    pub fn stop(&self) -> Result<()> {
        let left = self.left.stop();
        let right = self.right.stop();
        left.and(right)
    }

    pub fn resume(&self) -> Result<()> {
        let left = self.left.resume();
        let right = self.right.resume();
        left.and(right)
    }

    pub fn stats(&self, eye: Eye) -> StatsSnapshot {
        self.stream(eye).stats()
    }
}
