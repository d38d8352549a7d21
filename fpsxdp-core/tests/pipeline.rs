mod common;

use std::time::Duration;

use fpsxdp_common::checksum::ipv4_header_valid;
use fpsxdp_common::{
    shard_index, shard_slot, PlayerKey, JOIN_RESPONSE_PACKET, JOIN_RESPONSE_PACKET_SIZE,
    PAYLOAD_OFFSET, PLAYER_STATE_PACKET, PLAYER_STATE_PACKET_SIZE, PLAYER_STATE_SIZE,
    SERVER_PORT, STATS_RESPONSE_PACKET, STATS_RESPONSE_PACKET_SIZE,
};
use fpsxdp_core::{
    ControlPlane, DropReason, EngineConfig, FastPath, InputReceiver, SharedMaps, Verdict,
};

use common::*;

type Control = ControlPlane<std::sync::Arc<SharedMaps>>;

fn pipeline() -> (FastPath, Control) {
    let config = EngineConfig::default();
    let (maps, receiver): (_, InputReceiver) = SharedMaps::new(&config);
    let control = ControlPlane::new(maps.clone(), receiver, &config);
    (FastPath::new(maps), control)
}

#[test]
fn join_is_answered_with_server_time() {
    let (fast_path, _control) = pipeline();
    let mut frame = join(0x1, 555);
    assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);

    assert_eq!(frame.len(), 14 + 20 + 8 + JOIN_RESPONSE_PACKET_SIZE);
    let payload = &frame.as_bytes()[PAYLOAD_OFFSET..];
    assert_eq!(payload[0], JOIN_RESPONSE_PACKET);
    assert_eq!(le_u64(payload, 1), 0x1);
    assert_eq!(le_u64(payload, 9), 555);
    assert!(le_u64(payload, 17) > 0);

    let bytes = frame.as_bytes();
    assert_eq!(bytes[..6], CLIENT_MAC);
    assert_eq!(bytes[6..12], SERVER_MAC);
    assert_eq!(bytes[26..30], SERVER_IP);
    assert_eq!(bytes[30..34], CLIENT_IP);
    assert_eq!(u16::from_be_bytes([bytes[34], bytes[35]]), SERVER_PORT);
    assert_eq!(u16::from_be_bytes([bytes[36], bytes[37]]), CLIENT_PORT);
    assert_eq!(
        u16::from_be_bytes([bytes[38], bytes[39]]) as usize,
        8 + JOIN_RESPONSE_PACKET_SIZE
    );
    assert!(ipv4_header_valid(&ip_header(&frame)));
}

#[test]
fn repeated_join_keeps_session_record() {
    let (fast_path, _control) = pipeline();
    assert_eq!(fast_path.process(0, &mut join(0x2, 1)), Verdict::Tx);
    let first = fast_path.maps().sessions.lookup_session(0x2).unwrap();
    assert_eq!(fast_path.process(5, &mut join(0x2, 2)), Verdict::Tx);
    let second = fast_path.maps().sessions.lookup_session(0x2).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.next_input_sequence, 1000);
    assert_eq!(fast_path.maps().sessions.len(), 1);
}

#[test]
fn input_before_first_update_is_dropped_but_forwarded() {
    let (fast_path, mut control) = pipeline();
    fast_path.process(0, &mut join(0x1, 0));

    let mut frame = input(0x1, 1000, 5);
    assert_eq!(
        fast_path.process(0, &mut frame),
        Verdict::Drop(DropReason::MissingPlayerState { session_id: 0x1, shard: 0 })
    );
    assert_eq!(control.poll(Duration::from_secs(1)), 1);
    assert_eq!(control.updater().state(0x1).unwrap().t, 5);
}

#[test]
fn echo_reflects_previous_update() {
    let (fast_path, mut control) = pipeline();
    fast_path.process(0, &mut join(0x1, 0));
    fast_path.process(0, &mut input(0x1, 1000, 5));
    assert_eq!(control.poll(Duration::from_secs(1)), 1);

    let mut frame = input(0x1, 1001, 7);
    assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);
    assert_eq!(frame.len(), PAYLOAD_OFFSET + PLAYER_STATE_PACKET_SIZE);

    let payload = &frame.as_bytes()[PAYLOAD_OFFSET..];
    assert_eq!(payload[0], PLAYER_STATE_PACKET);
    assert_eq!(le_u64(payload, 1), 0x1);
    let data = &payload[9..9 + PLAYER_STATE_SIZE];
    for (i, &byte) in data.iter().enumerate() {
        assert_eq!(byte, ((5 + i) % 256) as u8, "byte {i}");
    }
    assert!(ipv4_header_valid(&ip_header(&frame)));

    // the dt=7 input is only visible after the next update
    assert_eq!(control.poll(Duration::from_secs(1)), 1);
    let mut frame = input(0x1, 1002, 1);
    assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);
    assert_eq!(frame.as_bytes()[PAYLOAD_OFFSET + 9], 12);
}

#[test]
fn stats_follow_published_totals() {
    let (fast_path, mut control) = pipeline();

    let mut frame = stats_request();
    assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);
    assert_eq!(frame.len(), PAYLOAD_OFFSET + STATS_RESPONSE_PACKET_SIZE);
    let payload = &frame.as_bytes()[PAYLOAD_OFFSET..];
    assert_eq!(payload[0], STATS_RESPONSE_PACKET);
    assert_eq!(le_u64(payload, 1), 0);

    fast_path.process(0, &mut join(0x1, 0));
    fast_path.process(1, &mut input(0x1, 1000, 1));
    assert_eq!(control.poll(Duration::from_secs(1)), 1);
    for seq in 1..3 {
        assert_eq!(fast_path.process(1, &mut input(0x1, 1000 + seq, 1)), Verdict::Tx);
    }
    let mut applied = 0;
    while applied < 2 {
        applied += control.poll(Duration::from_secs(1));
    }

    // not published yet
    let mut frame = stats_request();
    fast_path.process(0, &mut frame);
    assert_eq!(le_u64(&frame.as_bytes()[PAYLOAD_OFFSET..], 1), 0);

    control.publish_stats().unwrap();
    let mut frame = stats_request();
    fast_path.process(0, &mut frame);
    let payload = &frame.as_bytes()[PAYLOAD_OFFSET..];
    assert_eq!(le_u64(payload, 1), 3);
    // the first input found no state, the other two were answered
    assert_eq!(le_u64(payload, 9), 2);
}

#[test]
fn unknown_session_is_never_answered() {
    let (fast_path, mut control) = pipeline();
    let mut frame = input(0xdead, 1000, 5);
    let before = frame.clone();
    assert_eq!(
        fast_path.process(0, &mut frame),
        Verdict::Drop(DropReason::UnknownSession(0xdead))
    );
    assert_eq!(frame, before);
    assert_eq!(control.poll(Duration::from_millis(10)), 0);
}

#[test]
fn traffic_for_other_ports_passes() {
    let (fast_path, _control) = pipeline();
    let mut frame = frame(SERVER_PORT + 1, &[1, 0, 0, 0]);
    let before = frame.clone();
    assert_eq!(fast_path.process(0, &mut frame), Verdict::Pass);
    assert_eq!(frame, before);
}

#[test]
fn fast_path_and_updater_agree_on_placement() {
    let (fast_path, mut control) = pipeline();
    let ids = [
        0x0,
        0x1,
        0x1_0000,
        0x1f_0000 + 499,
        0x20_0000 + 500,
        0xdead_beef_cafe,
        u64::MAX,
    ];
    for &id in &ids {
        fast_path.process(0, &mut join(id, 0));
        fast_path.process(3, &mut input(id, 1000, 9));
    }
    let mut applied = 0;
    while applied < ids.len() {
        applied += control.poll(Duration::from_secs(1));
    }

    for &id in &ids {
        let key = PlayerKey::of(id);
        assert_eq!(key.shard, shard_index(id));
        assert_eq!(key.shard, ((id >> 16) % 32) as u32);
        assert_eq!(key.slot, shard_slot(id));
        assert_eq!(key.slot, id % 500);
        assert!(fast_path.maps().player_states.get(key.shard, key.slot).is_some());

        let mut frame = input(id, 1001, 1);
        assert_eq!(fast_path.process(3, &mut frame), Verdict::Tx, "session {id:#x}");
    }
}
