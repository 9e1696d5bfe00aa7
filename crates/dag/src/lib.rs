//! `dag` crate — pure, in-memory DAG algorithms: acyclicity validation,
//! topological ordering, downstream traversal, and dependency-predicate
//! evaluation. Nothing in this crate touches persistence or the network;
//! callers hand in node/edge sets directly or via the [`DagSource`] trait.

pub mod algo;
pub mod error;
pub mod models;
pub mod source;

pub use algo::{dependencies_satisfied, downstream_closure, topo_sort, validate};
pub use error::DagError;
pub use models::{DagEdge, DependencyType, ParentOutcome};
pub use source::DagSource;

#[cfg(test)]
mod tests;
