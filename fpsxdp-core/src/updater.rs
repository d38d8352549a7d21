//! Control-plane updater.
//!
//! Integrates every input event into the authoritative player state and
//! writes the record back into the shard the fast path reads from. Single
//! threaded: all updates for a session go through `&mut self`, so they
//! serialize.

use std::num::NonZeroUsize;

use fpsxdp_common::{InputEvent, PlayerKey, PlayerState, MAX_CPUS, NUM_SHARDS};
use lru::LruCache;
use tracing::debug;

use crate::stats::InputTally;
use crate::{CoreError, Result};

/// Where integrated player state is written back.
pub trait PlayerStateSink {
    fn put(&mut self, key: PlayerKey, state: &PlayerState) -> Result<()>;
}

/// Advances `state` by `dt` and regenerates its snapshot.
///
/// Placeholder simulation: byte `i` of the snapshot is `(t + i) mod 256`.
pub fn integrate(state: &mut PlayerState, dt: u64) {
    state.t = state.t.wrapping_add(dt);
    let base = state.t as u8;
    for (i, byte) in state.data.iter_mut().enumerate() {
        *byte = base.wrapping_add(i as u8);
    }
}

pub struct Updater<S> {
    sink: S,
    /// Authoritative copies, per shard, keyed by full session id.
    states: Vec<LruCache<u64, PlayerState>>,
    tally: InputTally,
}

impl<S: PlayerStateSink> Updater<S> {
    pub fn new(sink: S, capacity_per_shard: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity_per_shard).unwrap_or(NonZeroUsize::MIN);
        Self {
            sink,
            states: (0..NUM_SHARDS).map(|_| LruCache::new(capacity)).collect(),
            tally: InputTally::default(),
        }
    }

    /// Integrates one event that arrived on `cpu`.
    ///
    /// The input only counts as processed once the write-back succeeded.
    pub fn apply(&mut self, cpu: u32, event: &InputEvent) -> Result<()> {
        let session_id = event.session_id;
        let key = PlayerKey::of(session_id);
        let states = &mut self.states[key.shard as usize];

        if !states.contains(&session_id) {
            debug!("first player update for session {session_id:#x} on cpu {cpu}");
            states.put(session_id, PlayerState::zeroed());
        }
        let state = states
            .get_mut(&session_id)
            .ok_or(CoreError::StateEvicted { session_id })?;

        // TODO: integrate every input in the batch, not just the first
        integrate(state, event.dt);
        self.sink.put(key, state)?;

        self.tally.processed[cpu as usize % MAX_CPUS] += 1;
        Ok(())
    }

    /// Accounts for events the channel dropped on `cpu`.
    pub fn record_lost(&mut self, cpu: u32, count: u64) {
        self.tally.lost[cpu as usize % MAX_CPUS] += count;
    }

    pub fn tally(&self) -> InputTally {
        self.tally
    }

    pub fn processed(&self) -> u64 {
        self.tally.total_processed()
    }

    pub fn lost(&self) -> u64 {
        self.tally.total_lost()
    }

    pub fn state(&self, session_id: u64) -> Option<&PlayerState> {
        self.states[PlayerKey::of(session_id).shard as usize].peek(&session_id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
