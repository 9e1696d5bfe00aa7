//! `nodes` crate — the `ExecutableNode`/`JobContext` handler contract and
//! the `HandlerRegistry` the scheduler's Executor Runtime dispatches
//! through (§6, §9).
//!
//! Every handler — built-in or plugin-registered — implements
//! [`ExecutableNode`]. The `scheduler` crate looks handlers up by name via
//! [`HandlerRegistry::get`] and never constructs one directly.

pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::NodeError;
pub use registry::{HandlerProvider, HandlerRegistry};
pub use traits::{ExecutableNode, HandlerOutcome, JobContext};
