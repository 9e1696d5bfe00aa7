//! `ClusterCoordinator` — owns the live [`HashRing`] snapshot and answers
//! "which buckets do I own right now" for the local worker (§4.3).

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::membership::{ClusterMembership, MembershipEvent};
use crate::ring::{HashRing, WorkerId, DEFAULT_VNODES_PER_WORKER};

/// Describes the bucket movement caused by a single membership change, so
/// callers can decide what to do with in-flight work on buckets they just
/// lost (stop claiming new runs; let in-flight ones finish or get retried
/// by the new owner after lease expiry).
#[derive(Debug, Clone, Default)]
pub struct Handoff {
    pub gained: Vec<i32>,
    pub lost: Vec<i32>,
}

pub struct ClusterCoordinator<M: ClusterMembership> {
    membership: Arc<M>,
    ring: RwLock<Arc<HashRing>>,
    local_worker_id: WorkerId,
    bucket_count: i32,
    vnodes_per_worker: usize,
}

impl<M: ClusterMembership> ClusterCoordinator<M> {
    pub async fn new(membership: Arc<M>, local_worker_id: WorkerId, bucket_count: i32) -> Self {
        let snapshot = membership.snapshot().await;
        let ring = HashRing::build(&snapshot, DEFAULT_VNODES_PER_WORKER);
        Self {
            membership,
            ring: RwLock::new(Arc::new(ring)),
            local_worker_id,
            bucket_count,
            vnodes_per_worker: DEFAULT_VNODES_PER_WORKER,
        }
    }

    pub fn current_ring(&self) -> Arc<HashRing> {
        self.ring.read().clone()
    }

    /// Buckets this worker owns under the current ring snapshot.
    pub fn owned_buckets(&self) -> Vec<i32> {
        self.ring
            .read()
            .owned_buckets(&self.local_worker_id, self.bucket_count)
    }

    fn rebuild(&self, members: &[WorkerId]) -> Handoff {
        let before = self.owned_buckets_with(&self.ring.read());
        let next = Arc::new(HashRing::build(members, self.vnodes_per_worker));
        let after = self.owned_buckets_with(&next);
        *self.ring.write() = next;

        let before_set: std::collections::HashSet<_> = before.into_iter().collect();
        let after_set: std::collections::HashSet<_> = after.into_iter().collect();
        Handoff {
            gained: after_set.difference(&before_set).copied().collect(),
            lost: before_set.difference(&after_set).copied().collect(),
        }
    }

    fn owned_buckets_with(&self, ring: &HashRing) -> Vec<i32> {
        ring.owned_buckets(&self.local_worker_id, self.bucket_count)
    }

    pub fn on_worker_join(&self, members: &[WorkerId]) -> Handoff {
        info!(members = ?members, "rebuilding hash ring after worker join");
        self.rebuild(members)
    }

    pub fn on_worker_leave(&self, members: &[WorkerId]) -> Handoff {
        info!(members = ?members, "rebuilding hash ring after worker leave");
        self.rebuild(members)
    }

    /// Runs until the membership channel closes, rebuilding the ring on
    /// every join/leave event and handing the resulting [`Handoff`] to
    /// `on_handoff`.
    pub async fn run(&self, mut on_handoff: impl FnMut(Handoff) + Send) {
        let mut events = self.membership.subscribe();
        loop {
            match events.recv().await {
                Ok(MembershipEvent::WorkerJoined(_)) | Ok(MembershipEvent::WorkerLeft(_)) => {
                    let members = self.membership.snapshot().await;
                    let handoff = self.rebuild(&members);
                    on_handoff(handoff);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    let members = self.membership.snapshot().await;
                    let handoff = self.rebuild(&members);
                    on_handoff(handoff);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::InProcessMembership;

    #[tokio::test]
    async fn join_grows_owned_set_leave_shrinks_it() {
        let membership = Arc::new(InProcessMembership::new(vec!["w1".to_string()]));
        let coordinator = ClusterCoordinator::new(membership.clone(), "w1".to_string(), 64).await;
        let initial = coordinator.owned_buckets();
        assert_eq!(initial.len(), 64);

        membership.join("w2".to_string());
        let handoff = coordinator.on_worker_join(&membership.snapshot().await);
        assert!(!handoff.lost.is_empty());
        assert!(coordinator.owned_buckets().len() < 64);

        membership.leave("w2");
        let handoff = coordinator.on_worker_leave(&membership.snapshot().await);
        assert!(!handoff.gained.is_empty());
        assert_eq!(coordinator.owned_buckets().len(), 64);
    }
}
