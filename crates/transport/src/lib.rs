//! Broadcast bus: cross-worker control-plane messaging (§4.4, §6).

pub mod dedup;
pub mod error;
pub mod message;
pub mod transport;

pub use dedup::{DedupLru, DEFAULT_DEDUP_CAPACITY};
pub use error::TransportError;
pub use message::ControlMessage;
pub use transport::{InProcessTransport, Transport};
