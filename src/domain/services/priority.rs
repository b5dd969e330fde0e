//! Priority Service
//!
//! Default replication priority policy.

use crate::domain::entities::ReplicatedEntity;
use crate::domain::ports::PriorityPolicy;

/// Scores an entity by a hash of its name, in `[0.0, 1.0)`.
///
/// Carries no relevance meaning; it only gives a stable spread of scores so
/// the drain order is reproducible. Swap in a distance- or importance-based
/// policy for real games.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameHashPriority;

impl NameHashPriority {
    pub fn new() -> Self {
        Self
    }

    fn hash(name: &str) -> u32 {
        name.chars()
            .fold(0u32, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u32))
    }
}

impl PriorityPolicy for NameHashPriority {
    fn priority(&self, entity: &ReplicatedEntity) -> f32 {
        (Self::hash(entity.handle.name()) % 100) as f32 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityHandle, ReplicationPolicy};

    fn record(name: &str) -> ReplicatedEntity {
        ReplicatedEntity::new(EntityHandle::new(name), ReplicationPolicy::default())
    }

    #[test]
    fn test_priority_is_deterministic() {
        let policy = NameHashPriority::new();
        let a = record("Door_12");
        let b = record("Door_12");
        assert_eq!(policy.priority(&a), policy.priority(&b));
    }

    #[test]
    fn test_priority_range() {
        let policy = NameHashPriority::new();
        for name in ["", "a", "Player", "Projectile_99999", "ünïcødé"] {
            let p = policy.priority(&record(name));
            assert!((0.0..1.0).contains(&p), "{} -> {}", name, p);
        }
    }

    #[test]
    fn test_known_values() {
        // "a" = 97, "ab" = 97 * 31 + 98 = 3105
        let policy = NameHashPriority::new();
        assert!((policy.priority(&record("a")) - 0.97).abs() < 1e-6);
        assert!((policy.priority(&record("ab")) - 0.05).abs() < 1e-6);
        assert_eq!(policy.priority(&record("")), 0.0);
    }
}
