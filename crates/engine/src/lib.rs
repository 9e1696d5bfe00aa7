//! `engine` crate — core domain models, DAG validation, and the execution engine.

pub mod models;
pub mod error;
pub mod executor;

pub use error::EngineError;
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use models::{JobOutcome, JobRunSubset};
