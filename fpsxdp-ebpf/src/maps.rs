//! fpsxdp-ebpf: Maps
//!
//! Everything except the event stream is pinned by name so the control plane
//! (and bpftool) can reopen it.

use aya_ebpf::{
    macros::map,
    maps::{Array, LruHashMap, PerCpuArray, PerfEventArray},
};
use fpsxdp_common::{
    Counters, InputEvent, PlayerState, ServerStats, SessionData, MAX_SESSIONS, PLAYERS_PER_SHARD,
};

/// Keep a separate LRU list per CPU instead of one shared chain.
const BPF_F_NO_COMMON_LRU: u32 = 1 << 1;

#[map]
pub static SESSIONS: LruHashMap<u64, SessionData> =
    LruHashMap::pinned(MAX_SESSIONS as u32, BPF_F_NO_COMMON_LRU);

/// Single slot, written once per period by the aggregator.
#[map]
pub static SERVER_STATS: Array<ServerStats> = Array::pinned(1, 0);

#[map]
pub static COUNTERS: PerCpuArray<Counters> = PerCpuArray::pinned(1, 0);

#[map]
pub static INPUT_EVENTS: PerfEventArray<InputEvent> = PerfEventArray::new(0);

// one LRU map per shard. no array-of-maps support here, so the shard
// index is resolved with a match.
macro_rules! player_state_shards {
    ($($name:ident = $index:literal),* $(,)?) => {
        $(
            #[map]
            static $name: LruHashMap<u64, PlayerState> =
                LruHashMap::pinned(PLAYERS_PER_SHARD as u32, 0);
        )*

        #[inline(always)]
        pub fn player_state_shard(shard: u32) -> Option<&'static LruHashMap<u64, PlayerState>> {
            match shard {
                $($index => Some(&$name),)*
                _ => None,
            }
        }
    };
}

player_state_shards! {
    PLAYER_STATE_0 = 0,
    PLAYER_STATE_1 = 1,
    PLAYER_STATE_2 = 2,
    PLAYER_STATE_3 = 3,
    PLAYER_STATE_4 = 4,
    PLAYER_STATE_5 = 5,
    PLAYER_STATE_6 = 6,
    PLAYER_STATE_7 = 7,
    PLAYER_STATE_8 = 8,
    PLAYER_STATE_9 = 9,
    PLAYER_STATE_10 = 10,
    PLAYER_STATE_11 = 11,
    PLAYER_STATE_12 = 12,
    PLAYER_STATE_13 = 13,
    PLAYER_STATE_14 = 14,
    PLAYER_STATE_15 = 15,
    PLAYER_STATE_16 = 16,
    PLAYER_STATE_17 = 17,
    PLAYER_STATE_18 = 18,
    PLAYER_STATE_19 = 19,
    PLAYER_STATE_20 = 20,
    PLAYER_STATE_21 = 21,
    PLAYER_STATE_22 = 22,
    PLAYER_STATE_23 = 23,
    PLAYER_STATE_24 = 24,
    PLAYER_STATE_25 = 25,
    PLAYER_STATE_26 = 26,
    PLAYER_STATE_27 = 27,
    PLAYER_STATE_28 = 28,
    PLAYER_STATE_29 = 29,
    PLAYER_STATE_30 = 30,
    PLAYER_STATE_31 = 31,
}

/// Bumps this CPU's sent-response counter.
#[inline(always)]
pub fn count_player_state_sent() {
    if let Some(counters) = COUNTERS.get_ptr_mut(0) {
        unsafe { (*counters).player_state_packets_sent += 1 };
    }
}
