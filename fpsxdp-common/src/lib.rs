//! Layout shared by the XDP fast path and the userspace control plane.
//!
//! Everything in here is read or written by both sides of a BPF map, so the
//! types are `#[repr(C)]`, the wire structs are packed, and the key
//! derivation in [`shard`] is the single definition both ends compile.

#![cfg_attr(not(test), no_std)]

pub mod checksum;
pub mod shard;
pub mod wire;

pub use shard::{shard_index, shard_slot, PlayerKey};

// --- PROTOCOL ---

/// UDP port the fast path answers on.
pub const SERVER_PORT: u16 = 40000;

pub const JOIN_REQUEST_PACKET: u8 = 1;
pub const JOIN_RESPONSE_PACKET: u8 = 2;
pub const INPUT_PACKET: u8 = 3;
pub const STATS_REQUEST_PACKET: u8 = 4;
pub const STATS_RESPONSE_PACKET: u8 = 5;
pub const PLAYER_STATE_PACKET: u8 = 6;

pub const INPUT_SIZE: usize = 100;
pub const INPUTS_PER_PACKET: usize = 10;
pub const PLAYER_STATE_SIZE: usize = 1000;

pub const JOIN_REQUEST_PACKET_SIZE: usize = 1 + 8 + 8 + PLAYER_STATE_SIZE;
pub const JOIN_RESPONSE_PACKET_SIZE: usize = 1 + 8 + 8 + 8;
pub const INPUT_PACKET_SIZE: usize = 1 + 8 + 8 + 8 + (8 + INPUT_SIZE) * INPUTS_PER_PACKET;
pub const STATS_REQUEST_PACKET_SIZE: usize = 1 + 8 + 8;
pub const STATS_RESPONSE_PACKET_SIZE: usize = 1 + 8 + 8;
pub const PLAYER_STATE_PACKET_SIZE: usize = 1 + 8 + PLAYER_STATE_SIZE;

/// Sequence number a freshly joined session expects next.
pub const INITIAL_INPUT_SEQUENCE: u64 = 1000;

// --- FRAMING ---

pub const ETH_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
/// Offset of the first application byte in a frame we answer.
pub const PAYLOAD_OFFSET: usize = ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN;

pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;

// --- MAP SIZING ---

/// Upper bound on CPUs the fast path runs on. One player-state shard each.
pub const MAX_CPUS: usize = 32;
pub const NUM_SHARDS: usize = MAX_CPUS;
pub const PLAYERS_PER_SHARD: usize = 500;
pub const MAX_SESSIONS: usize = 100_000;

// --- MAP NAMES ---

pub const PROGRAM_NAME: &str = "fpsxdp";
pub const MAP_SESSIONS: &str = "SESSIONS";
pub const MAP_SERVER_STATS: &str = "SERVER_STATS";
pub const MAP_COUNTERS: &str = "COUNTERS";
pub const MAP_INPUT_EVENTS: &str = "INPUT_EVENTS";

/// Player-state shard maps, indexed by shard number.
pub const PLAYER_STATE_MAPS: [&str; NUM_SHARDS] = [
    "PLAYER_STATE_0",
    "PLAYER_STATE_1",
    "PLAYER_STATE_2",
    "PLAYER_STATE_3",
    "PLAYER_STATE_4",
    "PLAYER_STATE_5",
    "PLAYER_STATE_6",
    "PLAYER_STATE_7",
    "PLAYER_STATE_8",
    "PLAYER_STATE_9",
    "PLAYER_STATE_10",
    "PLAYER_STATE_11",
    "PLAYER_STATE_12",
    "PLAYER_STATE_13",
    "PLAYER_STATE_14",
    "PLAYER_STATE_15",
    "PLAYER_STATE_16",
    "PLAYER_STATE_17",
    "PLAYER_STATE_18",
    "PLAYER_STATE_19",
    "PLAYER_STATE_20",
    "PLAYER_STATE_21",
    "PLAYER_STATE_22",
    "PLAYER_STATE_23",
    "PLAYER_STATE_24",
    "PLAYER_STATE_25",
    "PLAYER_STATE_26",
    "PLAYER_STATE_27",
    "PLAYER_STATE_28",
    "PLAYER_STATE_29",
    "PLAYER_STATE_30",
    "PLAYER_STATE_31",
];

// --- SHARED RECORDS ---

/// Per-session bookkeeping kept in the session map.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionData {
    pub next_input_sequence: u64,
}

impl SessionData {
    pub const fn new() -> Self {
        Self {
            next_input_sequence: INITIAL_INPUT_SEQUENCE,
        }
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative simulation state of one player.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerState {
    /// Accumulated simulation time.
    pub t: u64,
    pub data: [u8; PLAYER_STATE_SIZE],
}

impl PlayerState {
    pub const fn zeroed() -> Self {
        Self {
            t: 0,
            data: [0; PLAYER_STATE_SIZE],
        }
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Published once per aggregation period, read when answering stats queries.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub inputs_processed: u64,
    pub player_state_packets_sent: u64,
}

/// Per-CPU counters bumped by the fast path.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub player_state_packets_sent: u64,
}

/// One input record forwarded from the fast path to the control plane.
///
/// Carries the input header plus the first input of the batch.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub session_id: u64,
    pub sequence: u64,
    pub t: u64,
    pub dt: u64,
    pub input: [u8; INPUT_SIZE],
    pub _pad: [u8; 4],
}

pub const INPUT_EVENT_SIZE: usize = core::mem::size_of::<InputEvent>();

impl InputEvent {
    /// Builds the event from an input packet body (type byte included).
    pub fn from_input_body(body: &[u8]) -> Option<Self> {
        if body.len() < INPUT_PACKET_SIZE || body[0] != INPUT_PACKET {
            return None;
        }
        let mut input = [0u8; INPUT_SIZE];
        input.copy_from_slice(&body[wire::INPUT_FIRST_PAYLOAD..wire::INPUT_FIRST_PAYLOAD + INPUT_SIZE]);
        Some(Self {
            session_id: wire::read_u64(body, wire::INPUT_SESSION_ID)?,
            sequence: wire::read_u64(body, wire::INPUT_SEQUENCE)?,
            t: wire::read_u64(body, wire::INPUT_T)?,
            dt: wire::read_u64(body, wire::INPUT_FIRST_DT)?,
            input,
            _pad: [0; 4],
        })
    }

    /// Decodes a raw record as written by the kernel into the event stream.
    pub fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() < INPUT_EVENT_SIZE {
            return None;
        }
        // SAFETY: length checked above; InputEvent is plain data with no invalid bit patterns.
        Some(unsafe { core::ptr::read_unaligned(record.as_ptr() as *const InputEvent) })
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SessionData {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for PlayerState {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ServerStats {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for Counters {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for InputEvent {}

const _: () = assert!(core::mem::size_of::<PlayerState>() == 8 + PLAYER_STATE_SIZE);
const _: () = assert!(INPUT_EVENT_SIZE == 136);
const _: () = assert!(INPUT_PACKET_SIZE == 1105);
