//! Replication Scheduler
//!
//! Priority queue of entities with fresh payloads, drained under a
//! per-tick budget and fanned out to every connection whose role passes
//! the entity's replication condition.
//!
//! The scheduler keeps no references to the registry or the connection
//! table; callers pass them into each operation.

use crate::config::ReplicationConfig;
use crate::domain::entities::{EntityHandle, ReplicatedEntity};
use crate::domain::events::{EventSink, ReplicationEvent};
use crate::domain::ports::{PriorityPolicy, RoleResolver};
use crate::domain::value_objects::ConnectionId;
use crate::replication::connections::ConnectionTable;
use crate::replication::registry::ReplicationRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    /// Entries that reached at least one connection
    pub replicated_actors: u64,
    /// Entries taken off the queue
    pub entries_processed: u64,
    /// Bytes accepted by the transport
    pub total_replication_size: u64,
    /// Failed sends
    pub replication_errors: u64,
    /// Non-empty drain passes
    pub passes: u64,
    /// Time spent in non-empty drain passes
    pub total_time: Duration,
}

impl SchedulerStats {
    /// Mean wall time of a drain pass.
    pub fn average_replication_time(&self) -> Duration {
        if self.passes == 0 {
            return Duration::ZERO;
        }
        self.total_time.div_f64(self.passes as f64)
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    entity: EntityHandle,
    priority: f32,
    seq: u64,
    /// Liveness of the registration the entry was queued for
    live: Arc<AtomicBool>,
}

impl QueueEntry {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Budgeted replication queue.
pub struct ReplicationScheduler {
    queue: Vec<QueueEntry>,
    members: HashMap<EntityHandle, Arc<AtomicBool>>,
    next_seq: u64,
    policy: Arc<dyn PriorityPolicy>,
    tick_rate: f64,
    max_per_tick: usize,
    enabled: bool,
    stats: SchedulerStats,
    events: EventSink,
}

impl ReplicationScheduler {
    /// Create a scheduler.
    pub fn new(config: &ReplicationConfig, policy: Arc<dyn PriorityPolicy>, events: EventSink) -> Self {
        Self {
            queue: Vec::new(),
            members: HashMap::new(),
            next_seq: 0,
            policy,
            tick_rate: config.tick_rate,
            max_per_tick: config.max_replication_per_tick,
            enabled: config.replication_enabled,
            stats: SchedulerStats::default(),
            events,
        }
    }

    // ===== Queue =====

    /// Priority of an entity under the current policy.
    pub fn calculate_priority(&self, entity: &ReplicatedEntity) -> f32 {
        self.policy.priority(entity)
    }

    /// Queue an entity. Returns false if it is unknown or already queued.
    pub fn add_to_queue(&mut self, registry: &ReplicationRegistry, entity: &EntityHandle) -> bool {
        self.drop_retired();
        if self.members.contains_key(entity) {
            return false;
        }
        let Some(info) = registry.replication_info(entity) else {
            tracing::warn!("not queueing unregistered entity {}", entity);
            return false;
        };

        let priority = self.calculate_priority(&info);
        self.push(&info, priority);
        true
    }

    fn push(&mut self, info: &ReplicatedEntity, priority: f32) {
        self.next_seq += 1;
        let live = info.live_flag();
        self.members.insert(info.handle.clone(), live.clone());
        self.queue.push(QueueEntry {
            entity: info.handle.clone(),
            priority,
            seq: self.next_seq,
            live,
        });
    }

    /// Drop an entity from the queue. Returns false if it was not queued.
    pub fn remove_from_queue(&mut self, entity: &EntityHandle) -> bool {
        self.drop_retired();
        if self.members.remove(entity).is_none() {
            return false;
        }
        self.queue.retain(|e| &e.entity != entity);
        true
    }

    /// Queue every entity the registry produced a payload for since the
    /// last call. Already-queued entities keep their place and will send
    /// the newest payload.
    pub fn collect_replicated(&mut self, registry: &ReplicationRegistry) -> usize {
        registry
            .take_replicated()
            .iter()
            .filter(|e| self.add_to_queue(registry, e))
            .count()
    }

    /// Recompute every queued entry's priority.
    pub fn update_replication_priorities(&mut self, registry: &ReplicationRegistry) {
        for entry in &mut self.queue {
            if let Some(info) = registry.replication_info(&entry.entity) {
                entry.priority = self.policy.priority(&info);
            }
        }
    }

    fn sort_queue(&mut self) {
        self.queue.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.seq.cmp(&b.seq))
        });
    }

    /// Forget entries whose registration ended.
    fn drop_retired(&mut self) {
        let before = self.queue.len();
        self.queue.retain(QueueEntry::is_live);
        if self.queue.len() != before {
            self.members = self
                .queue
                .iter()
                .map(|e| (e.entity.clone(), e.live.clone()))
                .collect();
            tracing::debug!("purged {} unregistered entities from queue", before - self.queue.len());
        }
    }

    fn live_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue.iter().filter(|e| e.is_live())
    }

    /// Drain up to `max_replication_per_tick` entries, highest priority
    /// first, ties in insertion order. Leftovers stay queued.
    ///
    /// Returns the number of entries taken off the queue.
    pub fn process_replication_queue(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
    ) -> usize {
        if !self.enabled {
            return 0;
        }

        self.drop_retired();
        if self.queue.is_empty() || self.max_per_tick == 0 {
            return 0;
        }

        let started = Instant::now();
        self.sort_queue();
        let take = self.max_per_tick.min(self.queue.len());
        let batch: Vec<QueueEntry> = self.queue.drain(..take).collect();

        let targets = connections.connection_ids();
        for entry in &batch {
            self.members.remove(&entry.entity);
            self.stats.entries_processed += 1;

            let Some(info) = registry
                .replication_info(&entry.entity)
                .filter(|_| entry.is_live())
            else {
                continue;
            };
            self.deliver(registry, connections, roles, &info, &targets);
        }

        self.stats.passes += 1;
        self.stats.total_time += started.elapsed();
        tracing::debug!(
            "replication queue: {} processed, {} left",
            batch.len(),
            self.queue.len()
        );
        batch.len()
    }

    /// One server tick: refresh priorities, refill from the registry's
    /// fresh payloads, then drain up to the budget.
    ///
    /// `dt` is informational; the caller's update cadence is the tick.
    pub fn process_server_replication(
        &mut self,
        dt: f64,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
    ) -> usize {
        if !self.enabled {
            return 0;
        }

        self.update_replication_priorities(registry);
        let added = self.collect_replicated(registry);
        let processed = self.process_replication_queue(registry, connections, roles);
        tracing::trace!(
            "server replication dt={:.4}: {} queued, {} processed",
            dt,
            added,
            processed
        );
        processed
    }

    /// Send an entity's last payload to each eligible target.
    ///
    /// Returns the number of connections that accepted it.
    fn deliver(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        info: &ReplicatedEntity,
        targets: &[ConnectionId],
    ) -> usize {
        let Some(payload) = info.status.payload.clone() else {
            tracing::debug!("{} has no payload yet, skipping", info.handle);
            return 0;
        };

        let mut delivered = 0;
        for &id in targets {
            if !info.can_replicate_to(roles.role_for(id)) {
                continue;
            }

            match connections.send(id, payload.clone()) {
                Ok(bytes) => {
                    delivered += 1;
                    self.stats.total_replication_size += bytes as u64;
                    self.events.emit(ReplicationEvent::ActorReplicated {
                        entity: info.handle.clone(),
                        connection: id,
                    });
                }
                // closed between snapshot and send
                Err(e) if e.is_not_registered() => {}
                Err(e) => {
                    self.stats.replication_errors += 1;
                    self.events.emit(ReplicationEvent::ReplicationError {
                        entity: info.handle.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if delivered > 0 {
            self.stats.replicated_actors += 1;
            registry.mark_initial_sent(&info.handle);
        }
        delivered
    }

    // ===== Direct replication =====

    /// Send every registered entity's last payload to every eligible
    /// connection, bypassing the queue.
    pub fn replicate_actors(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
    ) -> usize {
        let targets = connections.connection_ids();
        self.replicate_each(registry, connections, roles, &targets)
    }

    /// Send every registered entity to one connection.
    pub fn replicate_actors_to_client(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        client: ConnectionId,
    ) -> usize {
        if !connections.has_connection(client) {
            tracing::warn!("replicate to unknown connection {}", client);
            return 0;
        }
        self.replicate_each(registry, connections, roles, &[client])
    }

    fn replicate_each(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        targets: &[ConnectionId],
    ) -> usize {
        registry
            .replicated_objects()
            .iter()
            .filter_map(|e| registry.replication_info(e))
            .filter(|info| self.deliver(registry, connections, roles, info, targets) > 0)
            .count()
    }

    /// Send one entity to every eligible connection.
    pub fn replicate_actor_to_all(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        entity: &EntityHandle,
    ) -> usize {
        let Some(info) = registry.replication_info(entity) else {
            tracing::warn!("replicate of unregistered entity {}", entity);
            return 0;
        };
        let targets = connections.connection_ids();
        self.deliver(registry, connections, roles, &info, &targets)
    }

    /// Send one entity to one connection, if its role allows it.
    pub fn replicate_actor_to_client(
        &mut self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        entity: &EntityHandle,
        client: ConnectionId,
    ) -> bool {
        let Some(info) = registry.replication_info(entity) else {
            tracing::warn!("replicate of unregistered entity {}", entity);
            return false;
        };
        self.deliver(registry, connections, roles, &info, &[client]) > 0
    }

    // ===== Queries =====

    /// Queued entities in drain order.
    pub fn actors_to_replicate(&self) -> Vec<EntityHandle> {
        let mut entries: Vec<QueueEntry> = self.live_entries().cloned().collect();
        entries.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.entity).collect()
    }

    /// Registered entities a connection's role may receive.
    pub fn actors_for_client(
        &self,
        registry: &ReplicationRegistry,
        connections: &ConnectionTable,
        roles: &dyn RoleResolver,
        client: ConnectionId,
    ) -> Vec<EntityHandle> {
        if !connections.has_connection(client) {
            return Vec::new();
        }
        let role = roles.role_for(client);
        registry
            .replicated_objects()
            .into_iter()
            .filter(|e| registry.can_replicate_to(e, role))
            .collect()
    }

    /// Pending entries. Entries of unregistered entities are not counted.
    pub fn queue_size(&self) -> usize {
        self.live_entries().count()
    }

    pub fn contains(&self, entity: &EntityHandle) -> bool {
        self.members
            .get(entity)
            .map(|live| live.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Priority a queued entity was ranked with.
    pub fn priority(&self, entity: &EntityHandle) -> Option<f32> {
        self.live_entries()
            .find(|e| &e.entity == entity)
            .map(|e| e.priority)
    }

    /// Queue size relative to the per-tick budget.
    pub fn replication_load(&self) -> f64 {
        let pending = self.queue_size();
        if pending == 0 {
            return 0.0;
        }
        if self.max_per_tick == 0 {
            return f64::INFINITY;
        }
        pending as f64 / self.max_per_tick as f64
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    // ===== Settings =====

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    pub fn set_tick_rate(&mut self, hz: f64) {
        self.tick_rate = hz;
    }

    pub fn max_replication_per_tick(&self) -> usize {
        self.max_per_tick
    }

    pub fn set_max_replication_per_tick(&mut self, budget: usize) {
        self.max_per_tick = budget;
    }

    pub fn set_replication_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_replication_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_priority_policy(&mut self, policy: Arc<dyn PriorityPolicy>) {
        self.policy = policy;
    }

    // ===== Validation =====

    pub fn validate_actor_for_replication(&self, registry: &ReplicationRegistry, entity: &EntityHandle) -> bool {
        registry.validate_replication(entity)
    }

    pub fn validate_client_for_replication(&self, connections: &ConnectionTable, client: ConnectionId) -> bool {
        connections.validate_connection(client)
    }

    /// Tick rate and budget sanity.
    pub fn validate_server_replication(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            errors.push(format!("invalid replication tick rate: {}", self.tick_rate));
        }
        if self.max_per_tick == 0 {
            errors.push("invalid max replication per tick: 0".to_string());
        }
        errors
    }

    // ===== Cleanup =====

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.members.clear();
    }

    /// Clear the queue and statistics.
    pub fn reset(&mut self) {
        self.clear_queue();
        self.next_seq = 0;
        self.stats = SchedulerStats::default();
    }
}
