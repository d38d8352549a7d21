use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use fpsxdp_common::{ServerStats, MAX_CPUS};
use parking_lot::RwLock;

/// Monotonic per-CPU counters, one cache line each.
///
/// Increments are relaxed; readers sum whatever each CPU has published.
/// CPU indices wrap at [`MAX_CPUS`].
#[derive(Debug)]
pub struct PerCpuCounters {
    slots: Box<[CachePadded<AtomicU64>]>,
}

impl PerCpuCounters {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_CPUS).map(|_| CachePadded::new(AtomicU64::new(0))).collect(),
        }
    }

    #[inline]
    pub fn increment(&self, cpu: u32) {
        self.add(cpu, 1);
    }

    #[inline]
    pub fn add(&self, cpu: u32, n: u64) {
        self.slots[cpu as usize % MAX_CPUS].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, cpu: u32) -> u64 {
        self.slots[cpu as usize % MAX_CPUS].load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.slots.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn values(&self) -> [u64; MAX_CPUS] {
        let mut out = [0u64; MAX_CPUS];
        for (value, slot) in out.iter_mut().zip(self.slots.iter()) {
            *value = slot.load(Ordering::Relaxed);
        }
        out
    }
}

impl Default for PerCpuCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// The single published [`ServerStats`] record. Last writer wins.
#[derive(Debug, Default)]
pub struct PublishedStats {
    current: RwLock<ServerStats>,
}

impl PublishedStats {
    pub fn read(&self) -> ServerStats {
        *self.current.read()
    }

    pub fn publish(&self, stats: ServerStats) {
        *self.current.write() = stats;
    }
}
