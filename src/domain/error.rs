//! Replication Errors
//!
//! Every failure in the core is recovered locally; these values travel back
//! to the caller as `Result`s, log lines, or aggregated validation lists.

use crate::domain::value_objects::ConnectionId;

/// Errors surfaced by the replication core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplicationError {
    /// Bad input on registration (duplicate entity, unusable policy, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity is not registered
    #[error("entity not registered: {0}")]
    NotRegistered(String),

    /// The connection id is not active
    #[error("connection not found: {0}")]
    UnknownConnection(ConnectionId),

    /// Connection limit reached
    #[error("connection limit reached ({max})")]
    CapacityExceeded { max: usize },

    /// The serializer could not produce a payload
    #[error("serialization failed for {entity}: {reason}")]
    Serialization { entity: String, reason: String },

    /// The transport refused the payload
    #[error("transport error on {connection}: {reason}")]
    Transport {
        connection: ConnectionId,
        reason: String,
    },

    /// The coordinator has no live components
    #[error("replication coordinator not initialized")]
    NotInitialized,

    /// Aggregated configuration sanity failures
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ReplicationError {
    /// `NotRegistered` and `UnknownConnection` describe races between game
    /// logic and the tick; callers treat them as no-ops.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered(_) | Self::UnknownConnection(_))
    }
}
