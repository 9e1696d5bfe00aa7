//! `ClusterMembership` — the consumed interface (§6) the coordinator and
//! scheduler rely on for the live worker set.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::ring::WorkerId;

#[derive(Debug, Clone)]
pub enum MembershipEvent {
    WorkerJoined(WorkerId),
    WorkerLeft(WorkerId),
}

/// Stream of join/leave events, plus a snapshot of the currently live set.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    async fn snapshot(&self) -> Vec<WorkerId>;
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// In-process membership manager backed by a `tokio::sync::broadcast`
/// channel — the production equivalent would watch a service-discovery feed
/// (etcd/Consul/k8s endpoints); this is the single-binary/test substitute.
pub struct InProcessMembership {
    members: parking_lot::RwLock<Vec<WorkerId>>,
    tx: broadcast::Sender<MembershipEvent>,
}

impl InProcessMembership {
    pub fn new(initial: Vec<WorkerId>) -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            members: parking_lot::RwLock::new(initial),
            tx,
        }
    }

    pub fn join(&self, worker_id: WorkerId) {
        {
            let mut members = self.members.write();
            if !members.contains(&worker_id) {
                members.push(worker_id.clone());
            }
        }
        let _ = self.tx.send(MembershipEvent::WorkerJoined(worker_id));
    }

    pub fn leave(&self, worker_id: &str) {
        {
            let mut members = self.members.write();
            members.retain(|w| w != worker_id);
        }
        let _ = self
            .tx
            .send(MembershipEvent::WorkerLeft(worker_id.to_string()));
    }
}

#[async_trait]
impl ClusterMembership for InProcessMembership {
    async fn snapshot(&self) -> Vec<WorkerId> {
        self.members.read().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.tx.subscribe()
    }
}
