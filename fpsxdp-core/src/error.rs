use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("frame too short: need {needed} bytes, have {len}")]
    FrameTooShort { needed: usize, len: usize },
    #[error("cannot resize a {len} byte frame by {delta}")]
    FrameResize { len: usize, delta: isize },
    #[error("no player-state shard {0}")]
    UnknownShard(u32),
    #[error("player state for session {session_id:#x} vanished mid-update")]
    StateEvicted { session_id: u64 },
    #[error("failed to write player state (shard {shard}, slot {slot})")]
    StateWrite {
        shard: u32,
        slot: u64,
        #[source]
        source: BoxError,
    },
    #[error("failed to read per-cpu counters")]
    CounterRead(#[source] BoxError),
    #[error("failed to publish server stats")]
    StatsPublish(#[source] BoxError),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
