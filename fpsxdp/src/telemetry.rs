//! fpsxdp Telemetry
//!
//! Counters for the perf event path between the kernel and the updater.
//! Shared by every per-CPU reader task, read once per status line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct PerfMetrics {
    pub start_time: Instant,

    pub events_read: Arc<AtomicU64>,
    pub events_lost: Arc<AtomicU64>,
    /// Records too short to be an input event.
    pub undecodable: Arc<AtomicU64>,
}

impl PerfMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            events_read: Arc::new(AtomicU64::new(0)),
            events_lost: Arc::new(AtomicU64::new(0)),
            undecodable: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_read(&self, read: usize, lost: usize) {
        self.events_read.fetch_add(read as u64, Ordering::Relaxed);
        self.events_lost.fetch_add(lost as u64, Ordering::Relaxed);
    }

    pub fn record_undecodable(&self) {
        self.undecodable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "uptime: {}s | perf read: {} | perf lost: {} | undecodable: {}",
            self.start_time.elapsed().as_secs(),
            self.events_read.load(Ordering::Relaxed),
            self.events_lost.load(Ordering::Relaxed),
            self.undecodable.load(Ordering::Relaxed)
        )
    }
}
