//! Sharded player-state store.
//!
//! One bounded map per shard. The fast path only reads, the updater is the
//! only writer. Reads copy out under the shard's read lock, so a concurrent
//! write is seen either entirely or not at all.

use std::num::NonZeroUsize;

use fpsxdp_common::{PlayerState, NUM_SHARDS};
use lru::LruCache;
use parking_lot::RwLock;

use crate::{CoreError, Result};

/// The write lock is held for a single `put` by the one updater thread, the
/// read lock for one record copy. Neither is held across I/O, another lock,
/// or a caller's blocking work.
pub struct PlayerStateShard {
    records: RwLock<LruCache<u64, PlayerState>>,
}

impl PlayerStateShard {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            records: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Runs `f` against the record in `slot` without copying it out.
    ///
    /// `f` runs under the read lock and must not block.
    pub fn read_with<R>(&self, slot: u64, f: impl FnOnce(&PlayerState) -> R) -> Option<R> {
        self.records.read().peek(&slot).map(f)
    }

    pub fn get(&self, slot: u64) -> Option<PlayerState> {
        self.read_with(slot, |state| *state)
    }

    /// Overwrites whatever occupies `slot`, evicting the least recently
    /// written record if the shard is full.
    pub fn put(&self, slot: u64, state: &PlayerState) {
        self.records.write().put(slot, *state);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PlayerStateStore {
    shards: Box<[PlayerStateShard]>,
}

impl PlayerStateStore {
    pub fn new(capacity_per_shard: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity_per_shard).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: (0..NUM_SHARDS).map(|_| PlayerStateShard::new(capacity)).collect(),
        }
    }

    /// The outer lookup. `None` for an index past the last shard.
    pub fn shard(&self, index: u32) -> Option<&PlayerStateShard> {
        self.shards.get(index as usize)
    }

    pub fn get(&self, shard: u32, slot: u64) -> Option<PlayerState> {
        self.shard(shard)?.get(slot)
    }

    pub fn put(&self, shard: u32, slot: u64, state: &PlayerState) -> Result<()> {
        self.shard(shard).ok_or(CoreError::UnknownShard(shard))?.put(slot, state);
        Ok(())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
