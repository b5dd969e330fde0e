//! Entity Serializer Port
//!
//! Defines how an entity's current state becomes a sized payload.

use crate::domain::entities::ReplicatedEntity;
use bytes::Bytes;

/// Serialization failure reported by an [`EntitySerializer`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct SerializeError(pub String);

/// Turns an entity into the payload that is replicated to viewers.
///
/// This is an outbound port: the game layer owns the actual entity state
/// and provides an implementation. The core only records the payload size
/// and hands the bytes to the transport.
pub trait EntitySerializer: Send + Sync {
    /// Produce a payload for the entity's current state.
    fn serialize(&self, entity: &ReplicatedEntity) -> Result<Bytes, SerializeError>;
}
