//! Transport error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no subscriber for topic {0}")]
    UnknownTopic(String),

    #[error("no route to worker {0}")]
    UnknownWorker(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}
