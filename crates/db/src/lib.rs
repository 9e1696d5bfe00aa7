//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table in the scheduler's schema. No business logic lives here.

pub mod bucket;
pub mod dag_source;
pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use bucket::bucket_of;
pub use dag_source::PgDagSource;
pub use error::DbError;
pub use pool::DbPool;
