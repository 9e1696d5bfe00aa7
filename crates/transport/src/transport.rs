//! `Transport` — the consumed interface (§6) the scheduler and executor use
//! to fan messages out to the cluster and address individual workers.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::message::ControlMessage;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn broadcast(&self, topic: &str, message: ControlMessage) -> Result<(), TransportError>;

    async fn send_to(
        &self,
        worker_id: &str,
        message: ControlMessage,
    ) -> Result<(), TransportError>;

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ControlMessage>;

    /// A worker's private inbox for point-to-point `send_to` traffic (§4.7
    /// Shard Receiver registration). Distinct from `subscribe`, which is
    /// topic-scoped and shared by every listener.
    fn subscribe_worker(&self, worker_id: &str) -> broadcast::Receiver<ControlMessage>;
}

/// Single-binary/test transport: one `tokio::sync::broadcast` channel per
/// topic, plus a per-worker channel addressed by worker id for `send_to`.
///
/// A real deployment would swap this for a Redis/NATS-backed implementation
/// (not built here — out of scope, see `PersistenceBackedTransport` doc
/// below for where it would plug in).
pub struct InProcessTransport {
    topics: DashMap<String, broadcast::Sender<ControlMessage>>,
    workers: DashMap<String, broadcast::Sender<ControlMessage>>,
    channel_capacity: usize,
}

impl InProcessTransport {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            workers: DashMap::new(),
            channel_capacity,
        }
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<ControlMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .clone()
    }

    fn worker_sender(&self, worker_id: &str) -> broadcast::Sender<ControlMessage> {
        self.workers
            .entry(worker_id.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .clone()
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn broadcast(&self, topic: &str, message: ControlMessage) -> Result<(), TransportError> {
        let sender = self.topic_sender(topic);
        // No subscribers is not an error — a topic with nobody listening yet
        // (e.g. during startup) is expected, not a failure to report.
        let _ = sender.send(message);
        Ok(())
    }

    async fn send_to(
        &self,
        worker_id: &str,
        message: ControlMessage,
    ) -> Result<(), TransportError> {
        let sender = self.worker_sender(worker_id);
        let _ = sender.send(message);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ControlMessage> {
        self.topic_sender(topic).subscribe()
    }

    fn subscribe_worker(&self, worker_id: &str) -> broadcast::Receiver<ControlMessage> {
        self.worker_sender(worker_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(job_run_id: Uuid) -> ControlMessage {
        ControlMessage::Trigger {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_run_id,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribed_topic() {
        let transport = InProcessTransport::default();
        let mut rx = transport.subscribe("workflow-events");
        let job_run_id = Uuid::new_v4();
        transport
            .broadcast("workflow-events", sample(job_run_id))
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_id().is_nil(), false);
        match received {
            ControlMessage::Trigger { job_run_id: id, .. } => assert_eq!(id, job_run_id),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_is_scoped_per_worker() {
        let transport = InProcessTransport::default();
        let mut rx_a = transport.subscribe_worker("worker-a");
        let mut rx_b = transport.subscribe_worker("worker-b");
        let job_run_id = Uuid::new_v4();
        transport
            .send_to("worker-a", sample(job_run_id))
            .await
            .unwrap();

        rx_a.recv().await.unwrap();
        assert!(rx_b.try_recv().is_err());
    }
}
