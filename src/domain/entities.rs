//! Domain Entities - Core replication objects
//!
//! These entities represent the core concepts of the replication domain.
//! They have no I/O dependencies and contain only replication logic.

use crate::domain::services::visibility;
use crate::domain::value_objects::{ConnectionId, DeliveryKind, NetRole, ReplicationCondition};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Opaque handle to a game entity.
///
/// Handles compare by identity: two handles are equal only when they were
/// cloned from the same [`EntityHandle::new`] call, even if their names match.
#[derive(Clone)]
pub struct EntityHandle(Arc<EntityInner>);

struct EntityInner {
    name: String,
}

impl EntityHandle {
    /// Create a new handle with a human-readable name used for logging.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(EntityInner { name: name.into() }))
    }

    /// Human-readable name of the entity.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityHandle({}@{:#x})", self.0.name, self.addr())
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Replication policy of an entity.
///
/// Stays fixed for the lifetime of the registration unless replaced through
/// `ReplicationRegistry::update_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Delivery guarantee requested from the transport
    pub delivery: DeliveryKind,
    /// Which viewers may receive the entity
    pub condition: ReplicationCondition,
    /// Target replication frequency in Hz (must be > 0)
    pub frequency_hz: f64,
    /// The entity's own net role
    pub local_role: NetRole,
}

impl Default for ReplicationPolicy {
    fn default() -> Self {
        Self {
            delivery: DeliveryKind::Unreliable,
            condition: ReplicationCondition::None,
            frequency_hz: 1.0,
            local_role: NetRole::SimulatedProxy,
        }
    }
}

impl ReplicationPolicy {
    /// Create a policy with the given frequency and default kind/condition.
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            ..Default::default()
        }
    }

    /// Set the delivery kind.
    pub fn delivery(mut self, delivery: DeliveryKind) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the visibility condition.
    pub fn condition(mut self, condition: ReplicationCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the target frequency.
    pub fn frequency(mut self, frequency_hz: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    /// Set the entity's own role.
    pub fn local_role(mut self, role: NetRole) -> Self {
        self.local_role = role;
        self
    }

    /// A frequency is usable when it is finite and strictly positive.
    pub fn has_valid_frequency(&self) -> bool {
        self.frequency_hz.is_finite() && self.frequency_hz > 0.0
    }

    /// Maximum staleness allowed between two sends, in seconds.
    pub fn replication_interval(&self) -> f64 {
        1.0 / self.frequency_hz
    }
}

/// Live replication status of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationStatus {
    /// Unsent changes exist
    pub dirty: bool,
    /// No successful send has happened yet
    pub initial: bool,
    /// Whether replication is switched on for this entity
    pub replicated: bool,
    /// Simulation time of the last serialization, in seconds
    pub last_send_time: f64,
    /// Size of the last payload in bytes
    pub payload_size: usize,
    /// Last serialized payload
    pub payload: Option<Bytes>,
    /// Bumped on every `mark_dirty` so a concurrent mark survives a commit
    pub(crate) dirty_epoch: u64,
}

impl Default for ReplicationStatus {
    fn default() -> Self {
        Self {
            dirty: false,
            initial: true,
            replicated: true,
            last_send_time: 0.0,
            payload_size: 0,
            payload: None,
            dirty_epoch: 0,
        }
    }
}

/// An entity registered for replication: handle + policy + status.
#[derive(Debug, Clone)]
pub struct ReplicatedEntity {
    pub handle: EntityHandle,
    pub policy: ReplicationPolicy,
    pub status: ReplicationStatus,
    /// Distinguishes re-registrations of the same handle
    generation: u64,
    /// Shared by every snapshot of this registration; cleared on unregister
    live: Arc<AtomicBool>,
}

impl ReplicatedEntity {
    /// Create a fresh record: clean, initial, never sent.
    pub fn new(handle: EntityHandle, policy: ReplicationPolicy) -> Self {
        Self {
            handle,
            policy,
            status: ReplicationStatus::default(),
            generation: 0,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Registration this record belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the registration this snapshot came from has ended.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn live_flag(&self) -> Arc<AtomicBool> {
        self.live.clone()
    }

    pub(crate) fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Replication is on and the delivery kind is not `None`.
    pub fn is_valid_for_replication(&self) -> bool {
        self.status.replicated && self.policy.delivery != DeliveryKind::None
    }

    /// Dirty changes always win; otherwise replicate once the heartbeat
    /// interval `1 / frequency` has elapsed since the last send.
    pub fn should_replicate(&self, now: f64) -> bool {
        if self.status.dirty {
            return true;
        }
        now - self.status.last_send_time >= self.policy.replication_interval()
    }

    /// Whether a viewer with `role` may receive this entity.
    pub fn can_replicate_to(&self, role: NetRole) -> bool {
        visibility::can_replicate_to(self.policy.condition, role, self.status.initial)
    }

    pub fn is_dirty(&self) -> bool {
        self.status.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.status.dirty = true;
        self.status.dirty_epoch = self.status.dirty_epoch.wrapping_add(1);
    }

    pub fn clear_dirty(&mut self) {
        self.status.dirty = false;
    }

    /// Record a fresh payload produced at `now` and clear the dirty flag.
    pub fn record_payload(&mut self, payload: Bytes, now: f64) {
        self.status.payload_size = payload.len();
        self.status.payload = Some(payload);
        self.status.last_send_time = now;
        self.status.dirty = false;
    }

    /// Back to the freshly-registered state. The policy is kept.
    pub fn reset(&mut self) {
        let replicated = self.status.replicated;
        self.status = ReplicationStatus {
            replicated,
            ..Default::default()
        };
    }
}

/// Point-in-time view of a remote connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub address: String,
    pub port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Last round-trip time reported by the transport
    pub latency: Option<Duration>,
}

impl Connection {
    /// `address:port` form used in logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
