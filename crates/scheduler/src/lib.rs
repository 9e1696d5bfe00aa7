//! `scheduler` crate — the Job Scheduler & Executor half of the system
//! (spec §4.5-§4.7): per-shard preload/dispatch loops, the executor runtime
//! that runs handlers with timeout/retry semantics, and wide-fanout shard
//! coordination over the broadcast bus.

pub mod clock;
pub mod error;
pub mod instance;
pub mod runtime;
pub mod shard;

pub use clock::{Clock, SystemClock};
pub use error::SchedulerError;
pub use instance::{SchedulerConfig, SchedulerInstance};
pub use runtime::{ExecutorRuntime, RuntimeConfig};
pub use shard::{split_range, ShardCoordinator, ShardReceiver};
