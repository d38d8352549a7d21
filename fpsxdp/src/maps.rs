//! The kernel side of the shared maps, seen through the control-plane traits.

use anyhow::{Context, Result};
use aya::maps::{Array, HashMap, MapData, PerCpuArray};
use aya::Ebpf;
use fpsxdp_common::{
    Counters, PlayerKey, PlayerState, ServerStats, SessionData, MAP_COUNTERS, MAP_SERVER_STATS,
    MAP_SESSIONS, PLAYER_STATE_MAPS,
};
use fpsxdp_core::{CoreError, CounterSource, PlayerStateSink, StatsSink};

pub struct KernelMaps {
    sessions: HashMap<MapData, u64, SessionData>,
    player_states: Vec<HashMap<MapData, u64, PlayerState>>,
    server_stats: Array<MapData, ServerStats>,
    counters: PerCpuArray<MapData, Counters>,
}

impl KernelMaps {
    /// Takes ownership of every shared map. Any missing map is fatal.
    pub fn open(ebpf: &mut Ebpf) -> Result<Self> {
        let sessions = HashMap::try_from(take(ebpf, MAP_SESSIONS)?)?;
        let server_stats = Array::try_from(take(ebpf, MAP_SERVER_STATS)?)?;
        let counters = PerCpuArray::try_from(take(ebpf, MAP_COUNTERS)?)?;
        let player_states = PLAYER_STATE_MAPS
            .iter()
            .map(|name| Ok(HashMap::try_from(take(ebpf, name)?)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sessions,
            player_states,
            server_stats,
            counters,
        })
    }

    /// Walks the whole session map, so only call it at status-line rate.
    pub fn session_count(&self) -> usize {
        self.sessions.keys().filter(|key| key.is_ok()).count()
    }
}

fn take(ebpf: &mut Ebpf, name: &str) -> Result<aya::maps::Map> {
    ebpf.take_map(name)
        .with_context(|| format!("map {name} not found in object"))
}

impl PlayerStateSink for KernelMaps {
    fn put(&mut self, key: PlayerKey, state: &PlayerState) -> fpsxdp_core::Result<()> {
        let shard = self
            .player_states
            .get_mut(key.shard as usize)
            .ok_or(CoreError::UnknownShard(key.shard))?;
        shard
            .insert(key.slot, state, 0)
            .map_err(|err| CoreError::StateWrite {
                shard: key.shard,
                slot: key.slot,
                source: err.into(),
            })
    }
}

impl CounterSource for KernelMaps {
    fn player_state_packets_sent(&mut self) -> fpsxdp_core::Result<u64> {
        let per_cpu = self
            .counters
            .get(&0, 0)
            .map_err(|err| CoreError::CounterRead(err.into()))?;
        Ok(per_cpu.iter().map(|c| c.player_state_packets_sent).sum())
    }
}

impl StatsSink for KernelMaps {
    fn publish(&mut self, stats: &ServerStats) -> fpsxdp_core::Result<()> {
        self.server_stats
            .set(0, stats, 0)
            .map_err(|err| CoreError::StatsPublish(err.into()))
    }
}
