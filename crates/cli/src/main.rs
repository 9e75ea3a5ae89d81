//! # rtp-stream
//!
//! Plays raw H.264 Annex B files as a left/right pair of RTP streams,
//! standing in for a live encoder.
//!
//! ```bash
//! # Same file on both eyes, looped, SDP files for the receiver
//! rtp-stream --host 192.168.1.20 --input left.h264 --right-input right.h264 \
//!   --loop --sdp-dir /tmp/sdp
//!
//! ffplay -protocol_whitelist file,udp,rtp /tmp/sdp/left.sdp
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use streamer::media::nal::{NalType, extract_annexb_nal_units, split_access_units};
use streamer::{
    AccessUnit, Eye, LinkState, ParameterSets, StereoConfig, StereoStreamer, StreamConfig,
    TimestampMode,
};

#[derive(Parser)]
#[command(
    name = "rtp-stream",
    about = "Stream H.264 Annex B files as a stereo pair over RTP/UDP"
)]
struct Args {
    /// Receiver host name or IP address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Destination port of the left stream
    #[arg(long, default_value_t = streamer::stereo::DEFAULT_LEFT_PORT)]
    left_port: u16,

    /// Destination port of the right stream
    #[arg(long, default_value_t = streamer::stereo::DEFAULT_RIGHT_PORT)]
    right_port: u16,

    /// H.264 Annex B elementary stream for the left eye
    #[arg(long, short)]
    input: PathBuf,

    /// Annex B stream for the right eye (defaults to --input)
    #[arg(long)]
    right_input: Option<PathBuf>,

    /// Playback rate in frames per second
    #[arg(long, default_value_t = streamer::stream::config::DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Largest RTP payload before FU-A fragmentation
    #[arg(long, default_value_t = streamer::media::h264::DEFAULT_MTU)]
    mtu: usize,

    /// Fixed SSRC for both streams, decimal or 0x-prefixed hex (random per stream if unset)
    #[arg(long, value_parser = parse_ssrc)]
    ssrc: Option<u32>,

    /// Derive timestamps from the frame counter instead of presentation time
    #[arg(long)]
    fixed_rate: bool,

    /// Restart from the first frame at end of input
    #[arg(long = "loop")]
    looping: bool,

    /// Write left.sdp and right.sdp to this directory
    #[arg(long)]
    sdp_dir: Option<PathBuf>,
}

fn parse_ssrc(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid SSRC {s:?}: {e}"))
}

/// One access unit of a file, with in-band SPS/PPS moved out into the
/// format description the way a hardware encoder reports them.
struct Frame {
    nal_units: Vec<Vec<u8>>,
    keyframe: bool,
    parameter_sets: Option<ParameterSets>,
}

impl Frame {
    fn to_access_unit(&self, pts: Duration) -> AccessUnit {
        let unit =
            AccessUnit::from_nal_units(self.nal_units.iter().map(Vec::as_slice), self.keyframe)
                .with_pts(pts);
        match &self.parameter_sets {
            Some(sets) => unit.with_parameter_sets(sets.clone()),
            None => unit,
        }
    }
}

fn load_frames(path: &Path) -> anyhow::Result<Vec<Frame>> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let nal_units = extract_annexb_nal_units(&data);

    let mut frames = Vec::new();
    let mut sps: Option<&[u8]> = None;
    let mut pps: Option<&[u8]> = None;

    for access_unit in split_access_units(&nal_units) {
        let mut frame_nals = Vec::new();
        let mut keyframe = false;
        for nal in access_unit {
            match NalType::from_header(nal[0]) {
                NalType::Sps => sps = Some(nal),
                NalType::Pps => pps = Some(nal),
                NalType::AccessUnitDelimiter => {}
                nal_type => {
                    keyframe |= nal_type == NalType::IdrSlice;
                    frame_nals.push(nal.to_vec());
                }
            }
        }
        if frame_nals.is_empty() {
            continue;
        }

        let parameter_sets = match (keyframe, sps, pps) {
            (true, Some(sps), Some(pps)) => Some(ParameterSets::new(sps, pps)),
            _ => None,
        };
        frames.push(Frame {
            nal_units: frame_nals,
            keyframe,
            parameter_sets,
        });
    }

    anyhow::ensure!(
        !frames.is_empty(),
        "{} contains no H.264 access units",
        path.display()
    );
    let keyframes = frames.iter().filter(|f| f.keyframe).count();
    tracing::info!(
        path = %path.display(),
        nal_units = nal_units.len(),
        frames = frames.len(),
        keyframes,
        "input loaded"
    );
    if keyframes == 0 {
        tracing::warn!(path = %path.display(), "no IDR frames, receivers may never start decoding");
    }
    Ok(frames)
}

fn write_sdp(streamer: &StereoStreamer, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for eye in Eye::BOTH {
        let path = dir.join(format!("{eye}.sdp"));
        let sdp = streamer.stream(eye).sdp(&format!("{eye} eye"));
        fs::write(&path, sdp).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "SDP written");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let args = Args::parse();

    let left_frames = load_frames(&args.input)?;
    let right_frames = match &args.right_input {
        Some(path) => Some(load_frames(path)?),
        None => None,
    };
    let right_frames = right_frames.as_deref().unwrap_or(&left_frames);

    let config = StereoConfig {
        host: args.host.clone(),
        left_port: args.left_port,
        right_port: args.right_port,
        stream: StreamConfig {
            mtu: args.mtu,
            ssrc: args.ssrc,
            frame_rate: args.fps,
            timestamp_mode: if args.fixed_rate {
                TimestampMode::FixedRate
            } else {
                TimestampMode::PresentationTime
            },
            ..StreamConfig::default()
        },
    };
    let streamer = StereoStreamer::start(&config).context("starting streams")?;

    for (eye, frames) in [(Eye::Left, &left_frames[..]), (Eye::Right, right_frames)] {
        if let Some(sets) = frames.iter().find_map(|f| f.parameter_sets.as_ref()) {
            streamer.stream(eye).update_parameter_sets(&sets.sps, &sets.pps);
        }
    }
    if let Some(dir) = &args.sdp_dir {
        write_sdp(&streamer, dir)?;
    }

    tracing::info!(
        host = %args.host,
        left_port = args.left_port,
        right_port = args.right_port,
        fps = args.fps,
        looping = args.looping,
        "streaming"
    );

    let fps = args.fps.max(1) as f64;
    let frame_count = left_frames.len().max(right_frames.len());
    let started = Instant::now();
    let mut last_stats_log = Instant::now();
    let stats_interval = Duration::from_secs(5);
    let mut index: u64 = 0;

    loop {
        let position = (index % frame_count as u64) as usize;
        if index > 0 && position == 0 && !args.looping {
            break;
        }

        let pts = Duration::from_secs_f64(index as f64 / fps);
        for (eye, frames) in [(Eye::Left, &left_frames[..]), (Eye::Right, right_frames)] {
            // The shorter input wraps independently.
            let frame = &frames[position % frames.len()];
            if let Err(e) = streamer.send(eye, frame.to_access_unit(pts)) {
                tracing::debug!(%eye, error = %e, "access unit not queued");
            }
        }

        if last_stats_log.elapsed() >= stats_interval {
            for eye in Eye::BOTH {
                tracing::info!(%eye, status = %streamer.stream(eye).status(), stats = %streamer.stats(eye), "stream stats");
            }
            last_stats_log = Instant::now();
        }

        index += 1;
        let next = started + Duration::from_secs_f64(index as f64 / fps);
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    finish(&streamer)
}

/// Stop both streams and print their counters.
///
/// A stop is queued behind every pending access unit, so once both streams
/// report `Stopped` the queues have drained.
fn finish(streamer: &StereoStreamer) -> anyhow::Result<()> {
    streamer.stop().context("stopping streams")?;
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline
        && Eye::BOTH
            .iter()
            .any(|&eye| streamer.stream(eye).status() != LinkState::Stopped)
    {
        thread::sleep(Duration::from_millis(10));
    }
    for eye in Eye::BOTH {
        println!("{eye}: {}", streamer.stats(eye));
    }
    Ok(())
}
