//! `bucket_id(job_run) = hash(job_run.job_id) mod B` (§3 invariant).
//!
//! This is the job-id-space partition a `JobRun` is permanently assigned to
//! at creation time — distinct from the consistent-hash ring in the
//! `cluster` crate that maps *buckets* to *worker* ownership. A job's bucket
//! never changes after its JobRun is created.

use sha2::{Digest, Sha256};

/// Deterministic bucket assignment for a job id, stable across processes and
/// restarts (unlike `std::collections::hash_map::DefaultHasher`, which is
/// randomly seeded per-process).
pub fn bucket_of(job_id: &str, bucket_count: i32) -> i32 {
    let digest = Sha256::digest(job_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    let value = u64::from_be_bytes(bytes);
    (value % bucket_count as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_of_is_deterministic() {
        assert_eq!(bucket_of("job-123", 1024), bucket_of("job-123", 1024));
    }

    #[test]
    fn bucket_of_is_in_range() {
        for id in ["a", "b", "long-job-identifier-here", ""] {
            let b = bucket_of(id, 1024);
            assert!((0..1024).contains(&b));
        }
    }
}
