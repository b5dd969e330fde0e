//! Priority Policy Port
//!
//! Scores entities for the replication queue.

use crate::domain::entities::ReplicatedEntity;

/// Computes a replication priority for an entity.
///
/// Higher scores drain first. Implementations must be deterministic for a
/// given entity and state.
pub trait PriorityPolicy: Send + Sync {
    fn priority(&self, entity: &ReplicatedEntity) -> f32;
}
