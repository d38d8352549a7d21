//! Player-state placement.
//!
//! Both the fast path and the updater must land a session on the same shard
//! and slot, so this is the only place the derivation lives. The shard comes
//! from bits 16 and up so clustered ids still spread; the slot from the low
//! bits. Two sessions may share a slot in one shard, the later write wins.

use crate::{NUM_SHARDS, PLAYERS_PER_SHARD};

#[inline(always)]
pub const fn shard_index(session_id: u64) -> u32 {
    ((session_id >> 16) % NUM_SHARDS as u64) as u32
}

#[inline(always)]
pub const fn shard_slot(session_id: u64) -> u64 {
    session_id % PLAYERS_PER_SHARD as u64
}

/// Where a session's player state lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayerKey {
    pub shard: u32,
    pub slot: u64,
}

impl PlayerKey {
    #[inline(always)]
    pub const fn of(session_id: u64) -> Self {
        Self {
            shard: shard_index(session_id),
            slot: shard_slot(session_id),
        }
    }
}
