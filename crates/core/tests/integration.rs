//! Integration tests: real streams sending to a localhost UDP receiver.
//!
//! Each test binds an ephemeral receiver socket, starts one or two streams
//! aimed at it and decodes what arrives on the wire.

use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use streamer::media::rtp::RtpPacket;
use streamer::{
    AccessUnit, Eye, LinkState, PathStatus, StereoConfig, StereoStreamer, Stream, StreamConfig,
    StreamError, TimestampMode,
};

const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1E, 0x95];
const PPS: &[u8] = &[0x68, 0xCE, 0x38, 0x80];

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

fn port(socket: &UdpSocket) -> u16 {
    socket.local_addr().unwrap().port()
}

fn recv_packets(socket: &UdpSocket, count: usize) -> Vec<RtpPacket> {
    let mut buf = [0u8; 2048];
    (0..count)
        .map(|i| {
            let n = socket
                .recv(&mut buf)
                .unwrap_or_else(|e| panic!("packet {i} of {count} not received: {e}"));
            RtpPacket::parse(&buf[..n]).expect("valid RTP packet")
        })
        .collect()
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn slice(first_byte: u8) -> AccessUnit {
    AccessUnit::from_nal_units([&[0x41, first_byte, 0x00][..]], false)
}

#[test]
fn keyframe_sends_parameter_sets_then_fragments() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig {
        ssrc: Some(0xDEADBEEF),
        ..StreamConfig::new("127.0.0.1", port(&rx))
    })
    .unwrap();
    stream.update_parameter_sets(SPS, PPS);

    let mut idr = vec![0x65];
    idr.extend((0..2999).map(|i| (i % 251) as u8));
    let unit = AccessUnit::from_nal_units([&idr[..]], true).with_pts(Duration::from_secs(1));
    stream.send_access_unit(unit).unwrap();

    // SPS, PPS, then ceil(2999 / 1398) = 3 FU-A fragments
    let packets = recv_packets(&rx, 5);
    assert_eq!(packets[0].payload, SPS);
    assert_eq!(packets[1].payload, PPS);

    let mut reassembled = vec![(packets[2].payload[0] & 0xE0) | (packets[2].payload[1] & 0x1F)];
    for (i, packet) in packets[2..].iter().enumerate() {
        assert_eq!(packet.payload[0] & 0x1F, 28);
        assert_eq!(packet.payload[1] & 0x80 != 0, i == 0, "start bit");
        assert_eq!(packet.payload[1] & 0x40 != 0, i == 2, "end bit");
        assert_eq!(packet.header.marker, i == 2);
        assert!(packet.payload.len() <= 1400);
        reassembled.extend_from_slice(&packet.payload[2..]);
    }
    assert_eq!(reassembled, idr);

    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(packet.header.sequence, i as u16);
        assert_eq!(packet.header.timestamp, 90_000);
        assert_eq!(packet.header.ssrc, 0xDEADBEEF);
        assert_eq!(packet.header.payload_type, 96);
    }

    wait_for(|| stream.stats().access_units == 1);
    let stats = stream.stats();
    assert_eq!(stats.packets_sent, 5);
    assert_eq!(stats.parameter_set_packets, 2);
    assert_eq!(stats.fragmented_nal_units, 1);
    assert_eq!(stats.fragments_sent, 3);
}

#[test]
fn inband_parameter_sets_are_captured() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig::new("127.0.0.1", port(&rx))).unwrap();

    let idr: &[u8] = &[0x65, 0x88, 0x84];
    stream
        .send_access_unit(AccessUnit::from_nal_units([SPS, PPS, idr], true))
        .unwrap();

    // Injected SPS/PPS, then the unit's own three NAL units.
    let packets = recv_packets(&rx, 5);
    let payloads: Vec<&[u8]> = packets.iter().map(|p| p.payload.as_slice()).collect();
    assert_eq!(payloads, vec![SPS, PPS, SPS, PPS, idr]);

    let cached = stream.parameter_sets().expect("captured from bitstream");
    assert_eq!(cached.sps, SPS);
    assert_eq!(cached.pps, PPS);
}

#[test]
fn fixed_rate_timestamps_advance_per_access_unit() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig {
        timestamp_mode: TimestampMode::FixedRate,
        frame_rate: 30,
        ..StreamConfig::new("127.0.0.1", port(&rx))
    })
    .unwrap();

    for i in 0..3 {
        stream.send_access_unit(slice(0x80 | i)).unwrap();
    }
    let timestamps: Vec<u32> = recv_packets(&rx, 3)
        .iter()
        .map(|p| p.header.timestamp)
        .collect();
    assert_eq!(timestamps, vec![0, 3000, 6000]);
}

#[test]
fn sequence_continues_across_path_loss() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig::new("127.0.0.1", port(&rx))).unwrap();
    let ssrc = stream.ssrc();

    stream.send_access_unit(slice(0x80)).unwrap();
    stream.send_access_unit(slice(0x81)).unwrap();
    recv_packets(&rx, 2);

    stream.path_changed(PathStatus::Unsatisfied).unwrap();
    wait_for(|| stream.status() == LinkState::Degraded);

    // No socket until the path returns: the unit is dropped unsent.
    stream.send_access_unit(slice(0x90)).unwrap();
    wait_for(|| stream.stats().access_units_dropped == 1);
    assert_eq!(stream.status(), LinkState::Degraded);
    assert_eq!(stream.stats().reconnects, 0);

    stream.path_changed(PathStatus::Satisfied).unwrap();
    wait_for(|| stream.status() == LinkState::Ready);

    stream.send_access_unit(slice(0x82)).unwrap();
    let packet = &recv_packets(&rx, 1)[0];
    assert_eq!(packet.header.sequence, 2);
    assert_eq!(packet.header.ssrc, ssrc);
    assert_eq!(packet.payload[1], 0x82);
    assert_eq!(stream.stats().reconnects, 1);
    assert_eq!(stream.stats().packets_sent, 3);
}

#[test]
fn full_queue_drops_access_units_without_blocking() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig {
        queue_capacity: 1,
        ..StreamConfig::new("127.0.0.1", port(&rx))
    })
    .unwrap();

    const UNITS: u64 = 2000;
    let started = Instant::now();
    let mut queue_full = 0;
    for i in 0..UNITS {
        match stream.send_access_unit(slice(i as u8)) {
            Ok(()) => {}
            Err(StreamError::QueueFull) => queue_full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "producer blocked for {:?}",
        started.elapsed()
    );
    assert!(queue_full > 0, "a one-slot queue never filled");

    wait_for(|| {
        let stats = stream.stats();
        stats.access_units + stats.access_units_dropped == UNITS
    });
    let stats = stream.stats();
    assert_eq!(stats.access_units_dropped, queue_full);
    // One single-NAL packet per delivered unit, sent or counted as an error.
    assert_eq!(stats.packets_sent + stats.send_errors, stats.access_units);
    assert_eq!(stream.status(), LinkState::Ready);
}

#[test]
fn stop_drops_units_and_resume_continues_sequence() {
    let rx = receiver();
    let stream = Stream::start(StreamConfig::new("127.0.0.1", port(&rx))).unwrap();

    stream.send_access_unit(slice(0x80)).unwrap();
    assert_eq!(recv_packets(&rx, 1)[0].header.sequence, 0);

    stream.stop().unwrap();
    stream.send_access_unit(slice(0x81)).unwrap();
    wait_for(|| stream.stats().access_units_dropped == 1);
    assert_eq!(stream.status(), LinkState::Stopped);

    stream.resume().unwrap();
    stream.send_access_unit(slice(0x82)).unwrap();
    let packet = &recv_packets(&rx, 1)[0];
    assert_eq!(packet.header.sequence, 1);
    assert_eq!(packet.payload[1], 0x82);
    assert_eq!(stream.status(), LinkState::Ready);
}

#[test]
fn stereo_streams_are_independent() {
    let left_rx = receiver();
    let right_rx = receiver();
    let streamer = StereoStreamer::start(&StereoConfig {
        left_port: port(&left_rx),
        right_port: port(&right_rx),
        ..StereoConfig::new("127.0.0.1")
    })
    .unwrap();

    for i in 0..3 {
        streamer.send(Eye::Left, slice(0x80 | i)).unwrap();
    }
    streamer.send(Eye::Right, slice(0x90)).unwrap();

    let left = recv_packets(&left_rx, 3);
    let right = recv_packets(&right_rx, 1);

    let left_seqs: Vec<u16> = left.iter().map(|p| p.header.sequence).collect();
    assert_eq!(left_seqs, vec![0, 1, 2]);
    assert_eq!(right[0].header.sequence, 0);
    assert_eq!(right[0].payload[1], 0x90);
    assert_ne!(left[0].header.ssrc, right[0].header.ssrc);

    wait_for(|| streamer.stats(Eye::Left).access_units == 3);
    assert_eq!(streamer.stats(Eye::Right).access_units, 1);
}

#[test]
fn invalid_mtu_fails_at_start() {
    let result = Stream::start(StreamConfig {
        mtu: 2,
        ..StreamConfig::new("127.0.0.1", 5004)
    });
    assert!(matches!(result, Err(StreamError::InvalidConfig(_))));
}
