//! Stats aggregation.
//!
//! Once per interval the per-CPU tallies are summed into one snapshot and
//! published as the [`ServerStats`] record the fast path answers with.

use std::fmt;
use std::time::{Duration, Instant};

use fpsxdp_common::{ServerStats, MAX_CPUS};
use serde::Serialize;

use crate::Result;

/// Sum of the fast path's per-CPU sent-response counters.
pub trait CounterSource {
    fn player_state_packets_sent(&mut self) -> Result<u64>;
}

/// Where the aggregated record is published.
pub trait StatsSink {
    fn publish(&mut self, stats: &ServerStats) -> Result<()>;
}

/// Per-CPU input accounting kept by the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTally {
    pub processed: [u64; MAX_CPUS],
    pub lost: [u64; MAX_CPUS],
}

impl Default for InputTally {
    fn default() -> Self {
        Self {
            processed: [0; MAX_CPUS],
            lost: [0; MAX_CPUS],
        }
    }
}

impl InputTally {
    pub fn total_processed(&self) -> u64 {
        self.processed.iter().sum()
    }

    pub fn total_lost(&self) -> u64 {
        self.lost.iter().sum()
    }
}

/// Point-in-time snapshot produced by one aggregation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub inputs_processed: u64,
    pub inputs_lost: u64,
    pub player_state_packets_sent: u64,
    pub input_delta: u64,
    pub lost_delta: u64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input delta: {}, lost delta: {} | processed: {} | lost: {} | player state sent: {}",
            self.input_delta,
            self.lost_delta,
            self.inputs_processed,
            self.inputs_lost,
            self.player_state_packets_sent
        )
    }
}

pub struct StatsAggregator {
    interval: Duration,
    last_tick: Instant,
    previous: StatsReport,
}

impl StatsAggregator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: Instant::now(),
            previous: StatsReport::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True once a full interval has passed since the last tick.
    pub fn due(&self, now: Instant) -> bool {
        now.duration_since(self.last_tick) >= self.interval
    }

    /// Time left until the next tick is due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(now.duration_since(self.last_tick))
    }

    /// Sums, publishes, and returns the new snapshot. A failed publish is
    /// returned as an error and the previous snapshot is kept.
    pub fn tick<M>(&mut self, tally: &InputTally, maps: &mut M) -> Result<StatsReport>
    where
        M: CounterSource + StatsSink,
    {
        let inputs_processed = tally.total_processed();
        let inputs_lost = tally.total_lost();
        let player_state_packets_sent = maps.player_state_packets_sent()?;

        maps.publish(&ServerStats {
            inputs_processed,
            player_state_packets_sent,
        })?;

        let report = StatsReport {
            inputs_processed,
            inputs_lost,
            player_state_packets_sent,
            input_delta: inputs_processed.saturating_sub(self.previous.inputs_processed),
            lost_delta: inputs_lost.saturating_sub(self.previous.inputs_lost),
        };
        self.previous = report;
        self.last_tick = Instant::now();
        Ok(report)
    }
}
