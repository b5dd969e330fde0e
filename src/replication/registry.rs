//! Replication Registry
//!
//! Owns the entity → replication state mapping, the dirty set, and the
//! simulation clock used for heartbeat scheduling.
//!
//! Every method takes `&self`: game logic may register, unregister and mark
//! entities dirty from any thread while the tick thread runs
//! [`ReplicationRegistry::process_replication`]. Serialization happens
//! outside the lock so a serializer may call back into the registry.

use crate::config::ReplicationConfig;
use crate::domain::entities::{EntityHandle, ReplicatedEntity, ReplicationPolicy};
use crate::domain::error::ReplicationError;
use crate::domain::events::{EventSink, ReplicationEvent};
use crate::domain::ports::EntitySerializer;
use crate::domain::value_objects::{NetRole, ReplicationCondition};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RegistryState {
    entities: HashMap<EntityHandle, ReplicatedEntity>,
    /// Registration order, for deterministic iteration
    order: Vec<EntityHandle>,
    dirty: HashSet<EntityHandle>,
    /// Entities with a fresh payload the scheduler has not picked up yet
    fresh: Vec<EntityHandle>,
    fresh_set: HashSet<EntityHandle>,
    /// Simulation time in seconds
    now: f64,
    global_frequency: f64,
    /// Last generation handed to a registration
    generation: u64,
}

impl RegistryState {
    fn push_fresh(&mut self, handle: &EntityHandle) {
        if self.fresh_set.insert(handle.clone()) {
            self.fresh.push(handle.clone());
        }
    }

    fn forget(&mut self, handle: &EntityHandle) -> Option<ReplicatedEntity> {
        let record = self.entities.remove(handle)?;
        record.retire();
        self.order.retain(|h| h != handle);
        self.dirty.remove(handle);
        if self.fresh_set.remove(handle) {
            self.fresh.retain(|h| h != handle);
        }
        Some(record)
    }
}

/// Registry of replicated entities.
pub struct ReplicationRegistry {
    state: Mutex<RegistryState>,
    serializer: Arc<dyn EntitySerializer>,
    events: EventSink,
    enabled: AtomicBool,
    max_replication_size: AtomicUsize,
    errors: AtomicU64,
}

impl ReplicationRegistry {
    /// Create a registry.
    pub fn new(
        config: &ReplicationConfig,
        serializer: Arc<dyn EntitySerializer>,
        events: EventSink,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                global_frequency: config.global_replication_frequency,
                ..Default::default()
            }),
            serializer,
            events,
            enabled: AtomicBool::new(config.replication_enabled),
            max_replication_size: AtomicUsize::new(config.max_replication_size),
            errors: AtomicU64::new(0),
        }
    }

    // ===== Registration =====

    /// Register an entity.
    ///
    /// Fails with `InvalidArgument` if the entity is already registered or
    /// the policy frequency is not a finite positive number.
    pub fn register_object(
        &self,
        entity: EntityHandle,
        policy: ReplicationPolicy,
    ) -> Result<(), ReplicationError> {
        if !policy.has_valid_frequency() {
            tracing::error!(
                "rejecting {}: replication frequency must be > 0 (got {})",
                entity,
                policy.frequency_hz
            );
            return Err(ReplicationError::InvalidArgument(format!(
                "invalid replication frequency {} for {}",
                policy.frequency_hz, entity
            )));
        }

        let mut state = self.state.lock();
        if state.entities.contains_key(&entity) {
            tracing::error!("rejecting {}: already registered", entity);
            return Err(ReplicationError::InvalidArgument(format!(
                "entity already registered: {}",
                entity
            )));
        }

        state.generation += 1;
        let record = ReplicatedEntity::new(entity.clone(), policy).with_generation(state.generation);
        state.order.push(entity.clone());
        state.entities.insert(entity.clone(), record);
        drop(state);

        tracing::info!("entity registered for replication: {}", entity);
        Ok(())
    }

    /// Register an entity with the global default policy.
    pub fn register_default(&self, entity: EntityHandle) -> Result<(), ReplicationError> {
        self.register_object(entity, self.default_policy())
    }

    /// Unregister an entity. Returns false if it was unknown.
    pub fn unregister_object(&self, entity: &EntityHandle) -> bool {
        let removed = self.state.lock().forget(entity).is_some();
        if removed {
            tracing::info!("entity unregistered from replication: {}", entity);
        }
        removed
    }

    pub fn is_registered(&self, entity: &EntityHandle) -> bool {
        self.state.lock().entities.contains_key(entity)
    }

    /// Snapshot of an entity's record.
    pub fn replication_info(&self, entity: &EntityHandle) -> Option<ReplicatedEntity> {
        self.state.lock().entities.get(entity).cloned()
    }

    /// Replace an entity's policy. Status is kept.
    pub fn update_policy(
        &self,
        entity: &EntityHandle,
        policy: ReplicationPolicy,
    ) -> Result<(), ReplicationError> {
        if !policy.has_valid_frequency() {
            return Err(ReplicationError::InvalidArgument(format!(
                "invalid replication frequency {} for {}",
                policy.frequency_hz, entity
            )));
        }
        self.with_record(entity, "update_policy", |record| record.policy = policy)
            .ok_or_else(|| ReplicationError::NotRegistered(entity.to_string()))
    }

    /// Switch replication on or off for one entity.
    pub fn set_replicated(&self, entity: &EntityHandle, replicated: bool) -> bool {
        self.with_record(entity, "set_replicated", |record| {
            record.status.replicated = replicated
        })
        .is_some()
    }

    // ===== Dirty tracking =====

    /// Mark an entity as having unsent changes. Idempotent.
    pub fn mark_dirty(&self, entity: &EntityHandle) -> bool {
        let mut state = self.state.lock();
        match state.entities.get_mut(entity) {
            Some(record) => {
                record.mark_dirty();
                state.dirty.insert(entity.clone());
                true
            }
            None => {
                tracing::warn!("mark_dirty on unknown entity {}", entity);
                false
            }
        }
    }

    /// Clear an entity's dirty flag.
    pub fn clear_dirty(&self, entity: &EntityHandle) -> bool {
        let mut state = self.state.lock();
        match state.entities.get_mut(entity) {
            Some(record) => {
                record.clear_dirty();
                state.dirty.remove(entity);
                true
            }
            None => {
                tracing::warn!("clear_dirty on unknown entity {}", entity);
                false
            }
        }
    }

    pub fn is_dirty(&self, entity: &EntityHandle) -> bool {
        self.state
            .lock()
            .entities
            .get(entity)
            .map(|r| r.is_dirty())
            .unwrap_or(false)
    }

    /// Record that the entity reached at least one viewer.
    pub fn mark_initial_sent(&self, entity: &EntityHandle) {
        if let Some(record) = self.state.lock().entities.get_mut(entity) {
            record.status.initial = false;
        }
    }

    // ===== Eligibility =====

    /// Dirty, or at least `1 / frequency` seconds since the last send.
    /// False for unknown entities.
    pub fn should_replicate(&self, entity: &EntityHandle, now: f64) -> bool {
        self.state
            .lock()
            .entities
            .get(entity)
            .map(|r| r.should_replicate(now))
            .unwrap_or(false)
    }

    /// Whether a viewer with `role` may receive this entity.
    pub fn can_replicate_to(&self, entity: &EntityHandle, role: NetRole) -> bool {
        self.state
            .lock()
            .entities
            .get(entity)
            .map(|r| r.can_replicate_to(role))
            .unwrap_or(false)
    }

    // ===== Processing =====

    /// Current simulation time in seconds.
    pub fn now(&self) -> f64 {
        self.state.lock().now
    }

    /// Advance the clock by `dt` and replicate every valid entity that is
    /// due. Returns the number of entities that got a fresh payload.
    pub fn process_replication(&self, dt: f64) -> usize {
        let due: Vec<EntityHandle> = {
            let mut state = self.state.lock();
            state.now += dt.max(0.0);

            if !self.enabled.load(Ordering::Relaxed) {
                return 0;
            }

            let now = state.now;
            state
                .order
                .iter()
                .filter(|h| {
                    state
                        .entities
                        .get(*h)
                        .map(|r| r.is_valid_for_replication() && r.should_replicate(now))
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        let replicated = due
            .iter()
            .filter(|h| self.process_object_replication(h).is_ok())
            .count();

        if replicated > 0 {
            tracing::debug!("replication pass: {} of {} due entities replicated", replicated, due.len());
        }
        replicated
    }

    /// Force replication of one entity regardless of its schedule.
    pub fn replicate_object(&self, entity: &EntityHandle) -> Result<(), ReplicationError> {
        self.process_object_replication(entity)
    }

    /// Force replication of every registered entity.
    pub fn replicate_all_objects(&self) -> usize {
        self.replicated_objects()
            .iter()
            .filter(|h| self.process_object_replication(h).is_ok())
            .count()
    }

    /// Force replication of every dirty entity.
    pub fn replicate_dirty_objects(&self) -> usize {
        self.dirty_objects()
            .iter()
            .filter(|h| self.process_object_replication(h).is_ok())
            .count()
    }

    /// Serialize, stamp, clear dirty, notify.
    fn process_object_replication(&self, entity: &EntityHandle) -> Result<(), ReplicationError> {
        let (snapshot, epoch, now) = {
            let state = self.state.lock();
            let record = state
                .entities
                .get(entity)
                .ok_or_else(|| ReplicationError::NotRegistered(entity.to_string()))?;
            (record.clone(), record.status.dirty_epoch, state.now)
        };

        let payload = match self.serializer.serialize(&snapshot) {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail(entity, e.to_string())),
        };

        let max = self.max_replication_size.load(Ordering::Relaxed);
        if payload.len() > max {
            return Err(self.fail(
                entity,
                format!("payload of {} bytes exceeds limit of {}", payload.len(), max),
            ));
        }

        {
            let mut state = self.state.lock();
            let Some(record) = state
                .entities
                .get_mut(entity)
                .filter(|r| r.generation() == snapshot.generation())
            else {
                // unregistered (and possibly re-registered) while serializing
                return Err(ReplicationError::NotRegistered(entity.to_string()));
            };

            let marked_meanwhile = record.status.dirty_epoch != epoch;
            record.record_payload(payload, now);
            if marked_meanwhile {
                record.status.dirty = true;
            } else {
                state.dirty.remove(entity);
            }
            state.push_fresh(entity);
        }

        self.events
            .emit(ReplicationEvent::ObjectReplicated(entity.clone()));
        tracing::debug!("object replicated: {} at t={:.3}", entity, now);
        Ok(())
    }

    fn fail(&self, entity: &EntityHandle, reason: String) -> ReplicationError {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!("replication of {} failed: {}", entity, reason);
        self.events.emit(ReplicationEvent::ReplicationError {
            entity: entity.clone(),
            reason: reason.clone(),
        });
        ReplicationError::Serialization {
            entity: entity.to_string(),
            reason,
        }
    }

    /// Hand over entities with fresh payloads, in replication order.
    pub fn take_replicated(&self) -> Vec<EntityHandle> {
        let mut state = self.state.lock();
        state.fresh_set.clear();
        std::mem::take(&mut state.fresh)
    }

    // ===== Queries =====

    /// All registered entities, in registration order.
    pub fn replicated_objects(&self) -> Vec<EntityHandle> {
        self.state.lock().order.clone()
    }

    /// Dirty entities, in registration order.
    pub fn dirty_objects(&self) -> Vec<EntityHandle> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter(|h| state.dirty.contains(*h))
            .cloned()
            .collect()
    }

    /// Entities whose own role is `role`.
    pub fn objects_for_role(&self, role: NetRole) -> Vec<EntityHandle> {
        self.filter_objects(|r| r.policy.local_role == role)
    }

    /// Entities replicated under `condition`.
    pub fn objects_for_condition(&self, condition: ReplicationCondition) -> Vec<EntityHandle> {
        self.filter_objects(|r| r.policy.condition == condition)
    }

    fn filter_objects(&self, pred: impl Fn(&ReplicatedEntity) -> bool) -> Vec<EntityHandle> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter(|h| state.entities.get(*h).map(&pred).unwrap_or(false))
            .cloned()
            .collect()
    }

    fn with_record<R>(
        &self,
        entity: &EntityHandle,
        op: &str,
        f: impl FnOnce(&mut ReplicatedEntity) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        match state.entities.get_mut(entity) {
            Some(record) => Some(f(record)),
            None => {
                tracing::warn!("{} on unknown entity {}", op, entity);
                None
            }
        }
    }

    // ===== Statistics =====

    pub fn replicated_object_count(&self) -> usize {
        self.state.lock().entities.len()
    }

    pub fn dirty_object_count(&self) -> usize {
        self.state.lock().dirty.len()
    }

    /// Sum of the last payload size of every entity.
    pub fn total_replication_size(&self) -> usize {
        self.state
            .lock()
            .entities
            .values()
            .map(|r| r.status.payload_size)
            .sum()
    }

    /// Mean policy frequency, 0 when empty.
    pub fn average_replication_frequency(&self) -> f64 {
        let state = self.state.lock();
        if state.entities.is_empty() {
            return 0.0;
        }
        let total: f64 = state.entities.values().map(|r| r.policy.frequency_hz).sum();
        total / state.entities.len() as f64
    }

    /// Serialization failures so far.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    // ===== Settings =====

    pub fn set_replication_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_replication_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_global_replication_frequency(&self, hz: f64) {
        self.state.lock().global_frequency = hz;
    }

    pub fn global_replication_frequency(&self) -> f64 {
        self.state.lock().global_frequency
    }

    /// Policy used by [`ReplicationRegistry::register_default`].
    pub fn default_policy(&self) -> ReplicationPolicy {
        ReplicationPolicy::new(self.global_replication_frequency())
    }

    pub fn set_max_replication_size(&self, bytes: usize) {
        self.max_replication_size.store(bytes, Ordering::Relaxed);
    }

    pub fn max_replication_size(&self) -> usize {
        self.max_replication_size.load(Ordering::Relaxed)
    }

    // ===== Validation =====

    /// Registered, enabled, and with a delivery kind other than `None`.
    pub fn validate_replication(&self, entity: &EntityHandle) -> bool {
        self.state
            .lock()
            .entities
            .get(entity)
            .map(|r| r.is_valid_for_replication())
            .unwrap_or(false)
    }

    /// Describe every invalid record and oversized payload.
    pub fn validate_all_replication(&self) -> Vec<String> {
        let state = self.state.lock();
        let max = self.max_replication_size.load(Ordering::Relaxed);
        let mut errors = Vec::new();

        for handle in &state.order {
            let Some(record) = state.entities.get(handle) else {
                continue;
            };
            if !record.is_valid_for_replication() {
                errors.push(format!("invalid replication info for entity: {}", handle));
            }
            if record.status.payload_size > max {
                errors.push(format!("replication size exceeds limit for entity: {}", handle));
            }
        }

        if !(state.global_frequency.is_finite() && state.global_frequency > 0.0) {
            errors.push(format!(
                "invalid global replication frequency: {}",
                state.global_frequency
            ));
        }

        errors
    }

    // ===== Cleanup =====

    /// Drop every registration.
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        for record in state.entities.values() {
            record.retire();
        }
        state.entities.clear();
        state.order.clear();
        state.dirty.clear();
        state.fresh.clear();
        state.fresh_set.clear();
    }

    /// Reset every entity's status to the freshly-registered state.
    pub fn reset_replication(&self) {
        let mut state = self.state.lock();
        for record in state.entities.values_mut() {
            record.reset();
        }
        state.dirty.clear();
        state.fresh.clear();
        state.fresh_set.clear();
        self.errors.store(0, Ordering::Relaxed);
    }
}
