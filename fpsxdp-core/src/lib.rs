//! fpsxdp userspace engine.
//!
//! The same pipeline the XDP program runs, expressed over owned frames and
//! in-memory maps, plus the control-plane pieces that also drive the kernel
//! maps: the updater that integrates player state and the stats aggregator.
//!
//! Data flow:
//!
//! ```text
//! Frame -> FastPath (per CPU) -> { SessionStore, PlayerStateStore shard, InputSender, Tx }
//! InputReceiver -> Updater -> PlayerStateSink (shard write-back)
//! PerCpuCounters -> StatsAggregator -> StatsSink -> FastPath (stats answers)
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod control;
pub mod counters;
pub mod dispatcher;
pub mod error;
pub mod maps;
pub mod player;
pub mod session;
pub mod stats;
pub mod updater;

pub use channel::{input_channel, InputReceiver, InputSender};
pub use codec::{Classified, Frame, Malformed, Request};
pub use config::EngineConfig;
pub use control::ControlPlane;
pub use counters::{PerCpuCounters, PublishedStats};
pub use dispatcher::{DropReason, FastPath, Verdict};
pub use error::{CoreError, Result};
pub use maps::SharedMaps;
pub use player::PlayerStateStore;
pub use session::SessionStore;
pub use stats::{CounterSource, InputTally, StatsAggregator, StatsReport, StatsSink};
pub use updater::{integrate, PlayerStateSink, Updater};
