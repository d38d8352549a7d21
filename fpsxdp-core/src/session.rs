//! Session store.
//!
//! Globally addressable by session id, with recency tracked per partition
//! rather than in one shared LRU chain. Eviction order across partitions is
//! therefore approximate, which only ever costs a client a re-join.
//!
//! Partitions are picked from a hash of the whole id, not from the shard
//! key, so clustered ids still spread over every partition.

use std::num::NonZeroUsize;

use fpsxdp_common::{SessionData, NUM_SHARDS};
use lru::LruCache;
use parking_lot::Mutex;

const _: () = assert!(NUM_SHARDS.is_power_of_two());
const PARTITION_BITS: u32 = NUM_SHARDS.trailing_zeros();

/// Fibonacci hashing: the top bits of the product select the partition.
fn partition_index(session_id: u64) -> usize {
    (session_id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (u64::BITS - PARTITION_BITS)) as usize
}

/// Partition locks are held for one LRU operation on a small `Copy` record
/// and never across I/O or another lock.
pub struct SessionStore {
    partitions: Box<[Mutex<LruCache<u64, SessionData>>]>,
}

impl SessionStore {
    /// `capacity` is split evenly across partitions, at least one entry each.
    pub fn new(capacity: usize) -> Self {
        let per_partition = NonZeroUsize::new(capacity.div_ceil(NUM_SHARDS)).unwrap_or(NonZeroUsize::MIN);
        Self {
            partitions: (0..NUM_SHARDS).map(|_| Mutex::new(LruCache::new(per_partition))).collect(),
        }
    }

    fn partition(&self, session_id: u64) -> &Mutex<LruCache<u64, SessionData>> {
        &self.partitions[partition_index(session_id)]
    }

    /// Inserts a fresh session unless one exists. Returns true if it was created.
    ///
    /// An existing session is left exactly as it is, so a repeated join never
    /// resets its sequence.
    pub fn create_session(&self, session_id: u64) -> bool {
        let mut sessions = self.partition(session_id).lock();
        if sessions.contains(&session_id) {
            return false;
        }
        sessions.put(session_id, SessionData::new());
        true
    }

    /// `None` means the session is unknown or was evicted.
    pub fn lookup_session(&self, session_id: u64) -> Option<SessionData> {
        self.partition(session_id).lock().get(&session_id).copied()
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().cap().get()).sum()
    }
}
