//! Application packet layouts.
//!
//! The packed structs are what the XDP program casts the UDP payload to. The
//! offset constants describe the same layouts for code that works on byte
//! slices. Multi-byte fields are little-endian on the wire.

use crate::{
    INPUT_SIZE, JOIN_REQUEST_PACKET_SIZE, JOIN_RESPONSE_PACKET_SIZE, PLAYER_STATE_PACKET_SIZE,
    PLAYER_STATE_SIZE, STATS_REQUEST_PACKET_SIZE,
};

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct JoinRequest {
    pub packet_type: u8,
    pub session_id: u64,
    pub send_time: u64,
    pub player_data: [u8; PLAYER_STATE_SIZE],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct JoinResponse {
    pub packet_type: u8,
    pub session_id: u64,
    pub send_time: u64,
    pub server_time: u64,
}

/// Leading part of an input packet. Followed by `INPUTS_PER_PACKET` [`InputData`].
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct InputHeader {
    pub packet_type: u8,
    pub session_id: u64,
    pub sequence: u64,
    pub t: u64,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct InputData {
    pub dt: u64,
    pub input: [u8; INPUT_SIZE],
}

/// Stats request and response share this layout.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct StatsPacket {
    pub packet_type: u8,
    pub inputs_processed: u64,
    pub player_state_packets_sent: u64,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct PlayerStatePacket {
    pub packet_type: u8,
    pub session_id: u64,
    pub player_state: [u8; PLAYER_STATE_SIZE],
}

const _: () = assert!(core::mem::size_of::<JoinRequest>() == JOIN_REQUEST_PACKET_SIZE);
const _: () = assert!(core::mem::size_of::<JoinResponse>() == JOIN_RESPONSE_PACKET_SIZE);
const _: () = assert!(core::mem::size_of::<StatsPacket>() == STATS_REQUEST_PACKET_SIZE);
const _: () = assert!(core::mem::size_of::<PlayerStatePacket>() == PLAYER_STATE_PACKET_SIZE);
const _: () = assert!(core::mem::size_of::<InputHeader>() + core::mem::size_of::<InputData>() * crate::INPUTS_PER_PACKET == crate::INPUT_PACKET_SIZE);

// Offsets from the start of the UDP payload.
pub const PACKET_TYPE: usize = 0;

pub const JOIN_SESSION_ID: usize = 1;
pub const JOIN_SEND_TIME: usize = 9;
pub const JOIN_SERVER_TIME: usize = 17;

pub const INPUT_SESSION_ID: usize = 1;
pub const INPUT_SEQUENCE: usize = 9;
pub const INPUT_T: usize = 17;
pub const INPUT_FIRST_DT: usize = 25;
pub const INPUT_FIRST_PAYLOAD: usize = 33;

pub const STATS_INPUTS_PROCESSED: usize = 1;
pub const STATS_PLAYER_STATE_PACKETS_SENT: usize = 9;

pub const PLAYER_STATE_SESSION_ID: usize = 1;
pub const PLAYER_STATE_DATA: usize = 9;

#[inline(always)]
pub fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let field = bytes.get(at..at + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(field);
    Some(u64::from_le_bytes(raw))
}

/// Returns false when the field does not fit.
#[inline(always)]
pub fn write_u64(bytes: &mut [u8], at: usize, value: u64) -> bool {
    match bytes.get_mut(at..at + 8) {
        Some(field) => {
            field.copy_from_slice(&value.to_le_bytes());
            true
        }
        None => false,
    }
}
