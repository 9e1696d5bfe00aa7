//! Cluster-coordinator error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("lease for bucket {0} could not be acquired (lost the CAS race)")]
    LeaseLost(i32),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
