//! Transport Port
//!
//! Defines the hand-off point between the replication core and the wire.

use crate::domain::value_objects::ConnectionId;
use bytes::Bytes;

/// Failure reported by a [`Transport`] when it refuses a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The underlying channel or socket is gone
    #[error("transport closed")]
    Closed,
    /// The transport rejected the payload (backpressure, size, ...)
    #[error("payload rejected: {0}")]
    Rejected(String),
}

/// Delivers payloads to remote connections.
///
/// `send` must not block the tick: implementations queue the payload and
/// complete delivery asynchronously. Delivery, ordering, retry and backoff
/// are the transport's responsibility.
pub trait Transport: Send + Sync {
    /// Queue `payload` for `connection`.
    fn send(&self, connection: ConnectionId, payload: Bytes) -> Result<(), TransportError>;
}
