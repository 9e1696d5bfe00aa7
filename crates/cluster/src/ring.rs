//! Consistent-hash ring with virtual nodes (§4.3).
//!
//! The ring is keyed by `hash(worker_id + ":" + vnode_index)` and maps a
//! bucket id to the first vnode whose hash is `>=` the bucket's hash,
//! wrapping around to the first vnode if none is.
//!
//! A [`HashRing`] is an immutable snapshot: membership changes produce a new
//! ring entirely, which the coordinator swaps in atomically (§5 "the
//! consistent-hash ring is an immutable snapshot replaced atomically on
//! membership change").

use sha2::{Digest, Sha256};

pub type WorkerId = String;

/// Number of virtual nodes placed on the ring per worker, per §4.3.
pub const DEFAULT_VNODES_PER_WORKER: usize = 160;

fn hash_u64(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes)
}

#[derive(Debug, Clone)]
pub struct HashRing {
    /// Sorted by hash value; `(vnode_hash, owning_worker)`.
    vnodes: Vec<(u64, WorkerId)>,
    vnodes_per_worker: usize,
}

impl HashRing {
    /// Build a ring deterministically from a membership snapshot — no CRDT
    /// needed, since membership itself is the ground truth (§9).
    pub fn build(members: &[WorkerId], vnodes_per_worker: usize) -> Self {
        let mut vnodes: Vec<(u64, WorkerId)> = Vec::with_capacity(members.len() * vnodes_per_worker);
        for worker in members {
            for vnode_index in 0..vnodes_per_worker {
                let key = format!("{worker}:{vnode_index}");
                vnodes.push((hash_u64(&key), worker.clone()));
            }
        }
        vnodes.sort_by_key(|(h, _)| *h);
        Self { vnodes, vnodes_per_worker }
    }

    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    pub fn vnodes_per_worker(&self) -> usize {
        self.vnodes_per_worker
    }

    /// The worker currently owning `bucket_id`, or `None` if the ring has no
    /// members (rebalance window with zero live workers).
    pub fn owner_of(&self, bucket_id: i32) -> Option<&WorkerId> {
        if self.vnodes.is_empty() {
            return None;
        }
        let target = hash_u64(&bucket_id.to_string());
        let idx = self
            .vnodes
            .partition_point(|(h, _)| *h < target);
        let idx = if idx == self.vnodes.len() { 0 } else { idx };
        Some(&self.vnodes[idx].1)
    }

    /// All buckets in `[0, bucket_count)` owned by `worker_id`.
    pub fn owned_buckets(&self, worker_id: &str, bucket_count: i32) -> Vec<i32> {
        (0..bucket_count)
            .filter(|b| self.owner_of(*b).map(|o| o == worker_id).unwrap_or(false))
            .collect()
    }

    /// Distinct member set currently on the ring.
    pub fn members(&self) -> Vec<WorkerId> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (_, w) in &self.vnodes {
            if seen.insert(w.clone()) {
                out.push(w.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = HashRing::build(&[], DEFAULT_VNODES_PER_WORKER);
        assert!(ring.owner_of(42).is_none());
    }

    #[test]
    fn single_worker_owns_every_bucket() {
        let ring = HashRing::build(&["w1".to_string()], DEFAULT_VNODES_PER_WORKER);
        for b in 0..256 {
            assert_eq!(ring.owner_of(b).unwrap(), "w1");
        }
    }

    #[test]
    fn ring_is_deterministic_given_same_membership() {
        let members = vec!["w1".to_string(), "w2".to_string(), "w3".to_string()];
        let a = HashRing::build(&members, DEFAULT_VNODES_PER_WORKER);
        let b = HashRing::build(&members, DEFAULT_VNODES_PER_WORKER);
        for bucket in 0..1024 {
            assert_eq!(a.owner_of(bucket), b.owner_of(bucket));
        }
    }

    /// §8 testable property: for B >= 256, W <= 32, max bucket count per
    /// worker <= 1.5 * B / W.
    #[test]
    fn bucket_distribution_stays_within_bound() {
        let bucket_count = 1024;
        for &w_count in &[2usize, 4, 8, 16, 32] {
            let members: Vec<WorkerId> = (0..w_count).map(|i| format!("w{i}")).collect();
            let ring = HashRing::build(&members, DEFAULT_VNODES_PER_WORKER);

            let bound = (1.5 * bucket_count as f64 / w_count as f64).ceil() as usize;
            for worker in &members {
                let owned = ring.owned_buckets(worker, bucket_count).len();
                assert!(
                    owned <= bound,
                    "worker {worker} owns {owned} buckets, bound is {bound} (W={w_count})"
                );
            }
        }
    }

    proptest::proptest! {
        /// Same §8 property, generalized: for any B in [256, 4096] and any
        /// W in [1, 32], no worker ever owns more than 1.5 * B/W buckets.
        #[test]
        fn bucket_distribution_holds_for_arbitrary_b_and_w(
            bucket_count in 256i32..4096,
            w_count in 1usize..=32,
        ) {
            let members: Vec<WorkerId> = (0..w_count).map(|i| format!("w{i}")).collect();
            let ring = HashRing::build(&members, DEFAULT_VNODES_PER_WORKER);
            let bound = (1.5 * bucket_count as f64 / w_count as f64).ceil() as usize;

            for worker in &members {
                let owned = ring.owned_buckets(worker, bucket_count).len();
                prop_assert!(
                    owned <= bound,
                    "worker {worker} owns {owned} buckets, bound is {bound} (B={bucket_count}, W={w_count})"
                );
            }
        }

        /// Handoff property (§8): the set of buckets whose owner changes on
        /// a single worker join is exactly the diff between the two ring
        /// snapshots — no bucket moves that didn't change owner, and every
        /// bucket that changed owner shows up in the diff.
        #[test]
        fn handoff_matches_exact_ownership_diff(
            initial_w in 1usize..=16,
            bucket_count in 256i32..2048,
        ) {
            let before_members: Vec<WorkerId> = (0..initial_w).map(|i| format!("w{i}")).collect();
            let before = HashRing::build(&before_members, DEFAULT_VNODES_PER_WORKER);

            let mut after_members = before_members.clone();
            after_members.push("new-worker".to_string());
            let after = HashRing::build(&after_members, DEFAULT_VNODES_PER_WORKER);

            for bucket in 0..bucket_count {
                let before_owner = before.owner_of(bucket).cloned();
                let after_owner = after.owner_of(bucket).cloned();
                if before_owner == after_owner {
                    continue;
                }
                // Any bucket whose owner changed must now belong to the
                // joining worker — a single join can only hand buckets *to*
                // the new member, never reshuffle existing owners amongst
                // themselves.
                prop_assert_eq!(after_owner, Some("new-worker".to_string()));
            }
        }
    }
}
