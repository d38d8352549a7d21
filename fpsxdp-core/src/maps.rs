use std::sync::Arc;

use fpsxdp_common::{PlayerKey, PlayerState, ServerStats};

use crate::channel::{input_channel, InputReceiver, InputSender};
use crate::counters::{PerCpuCounters, PublishedStats};
use crate::player::PlayerStateStore;
use crate::session::SessionStore;
use crate::stats::{CounterSource, StatsSink};
use crate::updater::PlayerStateSink;
use crate::{EngineConfig, Result};

/// In-memory counterpart of the kernel maps, shared by every CPU's fast path
/// and the control plane.
pub struct SharedMaps {
    pub sessions: SessionStore,
    pub player_states: PlayerStateStore,
    pub server_stats: PublishedStats,
    /// Player-state responses sent, per CPU.
    pub counters: PerCpuCounters,
    pub inputs: InputSender,
}

impl SharedMaps {
    /// Builds the maps and hands back the consuming end of the input channel.
    pub fn new(config: &EngineConfig) -> (Arc<Self>, InputReceiver) {
        let (inputs, receiver) = input_channel(config.input_queue_depth);
        let maps = Arc::new(Self {
            sessions: SessionStore::new(config.max_sessions),
            player_states: PlayerStateStore::new(config.player_shard_capacity),
            server_stats: PublishedStats::default(),
            counters: PerCpuCounters::new(),
            inputs,
        });
        (maps, receiver)
    }
}

impl PlayerStateSink for Arc<SharedMaps> {
    fn put(&mut self, key: PlayerKey, state: &PlayerState) -> Result<()> {
        self.player_states.put(key.shard, key.slot, state)
    }
}

impl CounterSource for Arc<SharedMaps> {
    fn player_state_packets_sent(&mut self) -> Result<u64> {
        Ok(self.counters.sum())
    }
}

impl StatsSink for Arc<SharedMaps> {
    fn publish(&mut self, stats: &ServerStats) -> Result<()> {
        self.server_stats.publish(*stats);
        Ok(())
    }
}
