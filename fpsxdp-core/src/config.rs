use std::time::Duration;

use fpsxdp_common::{MAX_SESSIONS, PLAYERS_PER_SHARD};
use serde::{Deserialize, Serialize};

/// Sizing for the in-memory maps and the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots per CPU in the input event channel. Events beyond this are lost.
    pub input_queue_depth: usize,
    /// Session store capacity across all shards.
    pub max_sessions: usize,
    /// Records each player-state shard holds before evicting.
    pub player_shard_capacity: usize,
    /// Events drained per poll before the loop checks the stats timer.
    pub updater_batch: usize,
    pub stats_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_queue_depth: 4096,
            max_sessions: MAX_SESSIONS,
            player_shard_capacity: PLAYERS_PER_SHARD,
            updater_batch: 256,
            stats_interval: Duration::from_secs(1),
        }
    }
}
