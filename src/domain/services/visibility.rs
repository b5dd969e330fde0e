//! Visibility Service
//!
//! Decides whether a viewer in a given net role may receive an entity.

use crate::domain::value_objects::{NetRole, ReplicationCondition};

/// Evaluate a replication condition for a viewer.
///
/// `initial` is true while the entity has not yet been successfully sent.
/// `Custom` is an extension point: the core does not interpret it and lets
/// every viewer through.
pub fn can_replicate_to(condition: ReplicationCondition, role: NetRole, initial: bool) -> bool {
    match condition {
        ReplicationCondition::None => true,
        ReplicationCondition::InitialOnly => initial,
        ReplicationCondition::OwnerOnly => role == NetRole::Authority,
        ReplicationCondition::SkipOwner => role != NetRole::Authority,
        ReplicationCondition::SimulatedOnly => role == NetRole::SimulatedProxy,
        ReplicationCondition::AutonomousOnly => role == NetRole::AutonomousProxy,
        ReplicationCondition::SimulatedOrPhysics => {
            matches!(role, NetRole::SimulatedProxy | NetRole::Authority)
        }
        ReplicationCondition::InitialOrOwner => initial || role == NetRole::Authority,
        ReplicationCondition::Custom => true,
    }
}
