//! Fast-path dispatcher.
//!
//! Runs once per received frame on whichever CPU received it. Every branch
//! is a bounded amount of work over the frame and a few map lookups: no
//! allocation, no blocking, no loops over packet-controlled lengths.
//!
//! | request | answer                                    |
//! |---------|-------------------------------------------|
//! | join    | create session if absent, join response   |
//! | input   | forward event, last known player state    |
//! | stats   | published server stats                    |

use std::sync::Arc;

use fpsxdp_common::{
    wire, InputEvent, PlayerKey, JOIN_RESPONSE_PACKET, JOIN_RESPONSE_PACKET_SIZE,
    PAYLOAD_OFFSET, PLAYER_STATE_PACKET, PLAYER_STATE_PACKET_SIZE, PLAYER_STATE_SIZE,
    STATS_RESPONSE_PACKET, STATS_RESPONSE_PACKET_SIZE,
};
use tracing::{debug, trace};

use crate::codec::{self, Classified, Frame, Malformed, Request};
use crate::SharedMaps;

/// What to do with the frame, mirroring the XDP actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Send the rewritten frame back out the receiving interface.
    Tx,
    /// Hand the untouched frame to the normal network stack.
    Pass,
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed(Malformed),
    UnknownSession(u64),
    MissingShard(u32),
    /// Session is known but the updater has not produced its state yet.
    MissingPlayerState { session_id: u64, shard: u32 },
    /// The response could not be shaped into the frame.
    Unanswerable,
}

#[derive(Clone)]
pub struct FastPath {
    maps: Arc<SharedMaps>,
}

impl FastPath {
    pub fn new(maps: Arc<SharedMaps>) -> Self {
        Self { maps }
    }

    pub fn maps(&self) -> &Arc<SharedMaps> {
        &self.maps
    }

    /// Processes one frame received on `cpu`, rewriting it in place when answered.
    pub fn process(&self, cpu: u32, frame: &mut Frame) -> Verdict {
        match codec::classify(frame.as_bytes()) {
            Classified::NotOurs => Verdict::Pass,
            Classified::Malformed(reason) => {
                debug!("dropping malformed packet on cpu {cpu}: {reason:?}");
                Verdict::Drop(DropReason::Malformed(reason))
            }
            Classified::Request(Request::Join) => self.join(frame),
            Classified::Request(Request::Input) => self.input(cpu, frame),
            Classified::Request(Request::Stats) => self.stats(frame),
        }
    }

    fn join(&self, frame: &mut Frame) -> Verdict {
        let session_id = session_id(frame, wire::JOIN_SESSION_ID);
        if self.maps.sessions.create_session(session_id) {
            debug!("created session {session_id:#x}");
        }

        let payload = frame.payload_mut();
        payload[wire::PACKET_TYPE] = JOIN_RESPONSE_PACKET;
        wire::write_u64(payload, wire::JOIN_SERVER_TIME, server_time());
        answer(frame, JOIN_RESPONSE_PACKET_SIZE)
    }

    fn input(&self, cpu: u32, frame: &mut Frame) -> Verdict {
        let session_id = session_id(frame, wire::INPUT_SESSION_ID);
        if self.maps.sessions.lookup_session(session_id).is_none() {
            debug!("could not find session {session_id:#x}");
            return Verdict::Drop(DropReason::UnknownSession(session_id));
        }

        // forwarded regardless of whether the echo below succeeds
        if let Some(event) = InputEvent::from_input_body(frame.payload()) {
            if !self.maps.inputs.push(cpu, event) {
                trace!("input event lost on cpu {cpu}");
            }
        }

        let key = PlayerKey::of(session_id);
        let Some(shard) = self.maps.player_states.shard(key.shard) else {
            debug!("could not find player state shard {}", key.shard);
            return Verdict::Drop(DropReason::MissingShard(key.shard));
        };

        let payload = frame.payload_mut();
        let copied = shard.read_with(key.slot, |state| {
            payload[wire::PLAYER_STATE_DATA..wire::PLAYER_STATE_DATA + PLAYER_STATE_SIZE]
                .copy_from_slice(&state.data);
        });
        if copied.is_none() {
            debug!("could not find player state for session {session_id:#x}");
            return Verdict::Drop(DropReason::MissingPlayerState {
                session_id,
                shard: key.shard,
            });
        }
        // session id stays in place at the same offset
        payload[wire::PACKET_TYPE] = PLAYER_STATE_PACKET;

        let verdict = answer(frame, PLAYER_STATE_PACKET_SIZE);
        if verdict == Verdict::Tx {
            self.maps.counters.increment(cpu);
        }
        verdict
    }

    fn stats(&self, frame: &mut Frame) -> Verdict {
        let stats = self.maps.server_stats.read();

        let payload = frame.payload_mut();
        payload[wire::PACKET_TYPE] = STATS_RESPONSE_PACKET;
        wire::write_u64(payload, wire::STATS_INPUTS_PROCESSED, stats.inputs_processed);
        wire::write_u64(
            payload,
            wire::STATS_PLAYER_STATE_PACKETS_SENT,
            stats.player_state_packets_sent,
        );
        answer(frame, STATS_RESPONSE_PACKET_SIZE)
    }
}

/// Reflects the frame and trims it to exactly `response_size` payload bytes.
fn answer(frame: &mut Frame, response_size: usize) -> Verdict {
    if codec::reflect(frame.as_mut_bytes(), response_size).is_err() {
        return Verdict::Drop(DropReason::Unanswerable);
    }
    let delta = (PAYLOAD_OFFSET + response_size) as isize - frame.len() as isize;
    match frame.resize_tail(delta) {
        Ok(()) => Verdict::Tx,
        Err(_) => Verdict::Drop(DropReason::Unanswerable),
    }
}

/// Caller has already checked the body is complete.
fn session_id(frame: &Frame, at: usize) -> u64 {
    wire::read_u64(frame.payload(), at).unwrap_or_default()
}

/// Nanoseconds on the boot clock, the same clock `bpf_ktime_get_boot_ns` reads.
fn server_time() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid, writable timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{udp_frame, CLIENT_MAC, CLIENT_PORT};
    use crate::EngineConfig;
    use fpsxdp_common::{
        PlayerState, ServerStats, INPUT_PACKET, INPUT_PACKET_SIZE, JOIN_REQUEST_PACKET,
        JOIN_REQUEST_PACKET_SIZE, SERVER_PORT, STATS_REQUEST_PACKET, STATS_REQUEST_PACKET_SIZE,
    };

    fn fast_path() -> (FastPath, crate::InputReceiver) {
        let (maps, receiver) = SharedMaps::new(&EngineConfig::default());
        (FastPath::new(maps), receiver)
    }

    fn join_frame(session_id: u64) -> Frame {
        let mut body = vec![0u8; JOIN_REQUEST_PACKET_SIZE];
        body[0] = JOIN_REQUEST_PACKET;
        body[1..9].copy_from_slice(&session_id.to_le_bytes());
        body[9..17].copy_from_slice(&1234u64.to_le_bytes());
        Frame::new(udp_frame(SERVER_PORT, &body))
    }

    fn input_frame(session_id: u64) -> Frame {
        let mut body = vec![0u8; INPUT_PACKET_SIZE];
        body[0] = INPUT_PACKET;
        body[1..9].copy_from_slice(&session_id.to_le_bytes());
        body[25..33].copy_from_slice(&5u64.to_le_bytes());
        Frame::new(udp_frame(SERVER_PORT, &body))
    }

    fn stats_frame() -> Frame {
        let mut body = vec![0u8; STATS_REQUEST_PACKET_SIZE];
        body[0] = STATS_REQUEST_PACKET;
        Frame::new(udp_frame(SERVER_PORT, &body))
    }

    #[test]
    fn join_answers_and_creates_session() {
        let (fast_path, _rx) = fast_path();
        let mut frame = join_frame(0x77);
        assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);

        assert_eq!(frame.len(), PAYLOAD_OFFSET + JOIN_RESPONSE_PACKET_SIZE);
        let payload = frame.payload();
        assert_eq!(payload[0], JOIN_RESPONSE_PACKET);
        assert_eq!(wire::read_u64(payload, wire::JOIN_SESSION_ID), Some(0x77));
        assert_eq!(wire::read_u64(payload, wire::JOIN_SEND_TIME), Some(1234));
        assert!(wire::read_u64(payload, wire::JOIN_SERVER_TIME).unwrap() > 0);
        assert_eq!(frame.as_bytes()[..6], CLIENT_MAC);
        assert!(fast_path.maps().sessions.lookup_session(0x77).is_some());
    }

    #[test]
    fn input_for_unknown_session_is_dropped_without_event() {
        let (fast_path, rx) = fast_path();
        let mut frame = input_frame(0x99);
        let before = frame.clone();
        assert_eq!(
            fast_path.process(1, &mut frame),
            Verdict::Drop(DropReason::UnknownSession(0x99))
        );
        assert_eq!(frame, before);
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn input_without_player_state_is_dropped_but_forwarded() {
        let (fast_path, rx) = fast_path();
        assert_eq!(fast_path.process(0, &mut join_frame(0x5)), Verdict::Tx);

        let verdict = fast_path.process(3, &mut input_frame(0x5));
        assert_eq!(
            verdict,
            Verdict::Drop(DropReason::MissingPlayerState { session_id: 0x5, shard: 0 })
        );
        assert_eq!(rx.pending(), 1);
        assert_eq!(fast_path.maps().counters.sum(), 0);
    }

    #[test]
    fn input_echoes_last_known_state() {
        let (fast_path, rx) = fast_path();
        fast_path.process(0, &mut join_frame(0x5));
        let mut state = PlayerState::zeroed();
        state.t = 42;
        state.data.fill(0xEE);
        let key = PlayerKey::of(0x5);
        fast_path.maps().player_states.put(key.shard, key.slot, &state).unwrap();

        let mut frame = input_frame(0x5);
        assert_eq!(fast_path.process(2, &mut frame), Verdict::Tx);
        assert_eq!(frame.len(), PAYLOAD_OFFSET + PLAYER_STATE_PACKET_SIZE);
        let payload = frame.payload();
        assert_eq!(payload[0], PLAYER_STATE_PACKET);
        assert_eq!(wire::read_u64(payload, wire::PLAYER_STATE_SESSION_ID), Some(0x5));
        assert!(payload[wire::PLAYER_STATE_DATA..].iter().all(|&b| b == 0xEE));
        assert_eq!(fast_path.maps().counters.get(2), 1);
        assert_eq!(rx.pending(), 1);
    }

    #[test]
    fn stats_reflect_published_record() {
        let (fast_path, _rx) = fast_path();
        fast_path.maps().server_stats.publish(ServerStats {
            inputs_processed: 11,
            player_state_packets_sent: 22,
        });
        let mut frame = stats_frame();
        assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);
        assert_eq!(frame.len(), PAYLOAD_OFFSET + STATS_RESPONSE_PACKET_SIZE);
        let payload = frame.payload();
        assert_eq!(payload[0], STATS_RESPONSE_PACKET);
        assert_eq!(wire::read_u64(payload, wire::STATS_INPUTS_PROCESSED), Some(11));
        assert_eq!(wire::read_u64(payload, wire::STATS_PLAYER_STATE_PACKETS_SENT), Some(22));
        let dest_port = u16::from_be_bytes([frame.as_bytes()[36], frame.as_bytes()[37]]);
        assert_eq!(dest_port, CLIENT_PORT);
    }

    #[test]
    fn trailing_bytes_are_trimmed_from_responses() {
        let (fast_path, _rx) = fast_path();
        let mut bytes = stats_frame().into_bytes();
        bytes.extend_from_slice(&[0xFF; 64]);
        let mut frame = Frame::new(bytes);
        assert_eq!(fast_path.process(0, &mut frame), Verdict::Tx);
        assert_eq!(frame.len(), PAYLOAD_OFFSET + STATS_RESPONSE_PACKET_SIZE);
    }

    #[test]
    fn other_ports_pass_untouched() {
        let (fast_path, _rx) = fast_path();
        let mut frame = Frame::new(udp_frame(53, &[1, 2, 3]));
        let before = frame.clone();
        assert_eq!(fast_path.process(0, &mut frame), Verdict::Pass);
        assert_eq!(frame, before);
    }

    #[test]
    fn short_body_on_game_port_is_dropped() {
        let (fast_path, _rx) = fast_path();
        let mut frame = Frame::new(udp_frame(SERVER_PORT, &[JOIN_REQUEST_PACKET, 0, 0]));
        assert!(matches!(
            fast_path.process(0, &mut frame),
            Verdict::Drop(DropReason::Malformed(Malformed::Short { .. }))
        ));
    }
}
