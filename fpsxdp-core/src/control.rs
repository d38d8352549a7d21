//! Control-plane loop.
//!
//! Owns the consuming end of the input channel, the updater and the stats
//! aggregator. Runs on one thread; nothing here is on the packet path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fpsxdp_common::InputEvent;
use tracing::{info, warn};

use crate::stats::{CounterSource, StatsAggregator, StatsReport, StatsSink};
use crate::updater::{PlayerStateSink, Updater};
use crate::{EngineConfig, InputReceiver, Result};

pub struct ControlPlane<M> {
    updater: Updater<M>,
    receiver: InputReceiver,
    aggregator: StatsAggregator,
    batch: usize,
}

impl<M> ControlPlane<M>
where
    M: PlayerStateSink + CounterSource + StatsSink,
{
    pub fn new(maps: M, receiver: InputReceiver, config: &EngineConfig) -> Self {
        Self {
            updater: Updater::new(maps, config.player_shard_capacity),
            receiver,
            aggregator: StatsAggregator::new(config.stats_interval),
            batch: config.updater_batch.max(1),
        }
    }

    /// Waits up to `timeout` for input, then applies whatever is ready, up
    /// to one batch. Returns the number of events applied or rejected.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        let Some((cpu, first)) = self.receiver.recv_timeout(timeout) else {
            self.collect_lost();
            return 0;
        };

        let updater = &mut self.updater;
        let mut apply = |cpu: u32, event: InputEvent| {
            if let Err(err) = updater.apply(cpu, &event) {
                warn!("failed to apply input from cpu {cpu}: {err}");
            }
        };
        apply(cpu, first);
        let seen = 1 + self.receiver.drain(self.batch - 1, &mut apply);

        self.collect_lost();
        seen
    }

    fn collect_lost(&mut self) {
        for (cpu, count) in self.receiver.take_lost() {
            warn!("lost {count} input events on cpu {cpu}");
            self.updater.record_lost(cpu, count);
        }
    }

    /// Aggregates and publishes the current stats right away.
    pub fn publish_stats(&mut self) -> Result<StatsReport> {
        let tally = self.updater.tally();
        self.aggregator.tick(&tally, self.updater.sink_mut())
    }

    /// Publishes stats if the interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> Result<Option<StatsReport>> {
        if !self.aggregator.due(now) {
            return Ok(None);
        }
        self.publish_stats().map(Some)
    }

    /// Runs until `stop` is set. A failed stats publish ends the loop.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        info!(
            "control plane running, stats every {:?}",
            self.aggregator.interval()
        );
        while !stop.load(Ordering::Relaxed) {
            let wait = self.aggregator.remaining(Instant::now());
            self.poll(wait.min(Duration::from_millis(100)));
            if let Some(report) = self.tick(Instant::now())? {
                info!("{report}");
            }
        }
        info!("control plane stopped");
        Ok(())
    }

    pub fn updater(&self) -> &Updater<M> {
        &self.updater
    }

    pub fn maps(&self) -> &M {
        self.updater.sink()
    }
}
