//! Replication Coordinator
//!
//! Owns one registry, one connection table and one scheduler, and drives
//! them once per tick. The host creates and owns the coordinator; there is
//! no process-wide instance.

use crate::adapters::outbound::{DashMapRoleResolver, FrameSerializer, NullTransport};
use crate::config::ReplicationConfig;
use crate::domain::entities::{EntityHandle, ReplicationPolicy};
use crate::domain::error::ReplicationError;
use crate::domain::events::{EventSink, ReplicationEvent};
use crate::domain::ports::{EntitySerializer, PriorityPolicy, RoleResolver, Transport};
use crate::domain::services::NameHashPriority;
use crate::domain::value_objects::ConnectionId;
use crate::replication::connections::ConnectionTable;
use crate::replication::registry::ReplicationRegistry;
use crate::replication::scheduler::{ReplicationScheduler, SchedulerStats};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of one [`ReplicationCoordinator::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Entities that got a fresh payload this tick
    pub objects_replicated: usize,
    /// Entries drained from the scheduler queue
    pub entries_processed: usize,
}

/// Point-in-time view of the whole system.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorStats {
    pub initialized: bool,
    pub replication_enabled: bool,
    pub network_enabled: bool,
    pub replicated_objects: usize,
    pub dirty_objects: usize,
    pub connections: usize,
    pub queue_size: usize,
    pub replication_load: f64,
    pub replication_performance: f64,
    pub total_replication_size: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub serialization_errors: u64,
    pub dropped_events: u64,
    pub scheduler: SchedulerStats,
}

/// Top-level replication facade.
pub struct ReplicationCoordinator {
    config: ReplicationConfig,
    serializer: Arc<dyn EntitySerializer>,
    transport: Arc<dyn Transport>,
    roles: Arc<dyn RoleResolver>,
    priority: Arc<dyn PriorityPolicy>,
    events: EventSink,
    event_rx: Option<mpsc::Receiver<ReplicationEvent>>,
    registry: Option<Arc<ReplicationRegistry>>,
    connections: Option<Arc<ConnectionTable>>,
    scheduler: Option<ReplicationScheduler>,
    replication_enabled: bool,
    network_enabled: bool,
}

impl ReplicationCoordinator {
    /// Create a coordinator. Components are built by [`initialize`].
    ///
    /// [`initialize`]: ReplicationCoordinator::initialize
    pub fn new(
        config: ReplicationConfig,
        serializer: Arc<dyn EntitySerializer>,
        transport: Arc<dyn Transport>,
        roles: Arc<dyn RoleResolver>,
    ) -> Self {
        let (events, event_rx) = EventSink::channel(config.event_capacity);
        let replication_enabled = config.replication_enabled;
        let network_enabled = config.network_enabled;

        Self {
            config,
            serializer,
            transport,
            roles,
            priority: Arc::new(NameHashPriority::new()),
            events,
            event_rx: Some(event_rx),
            registry: None,
            connections: None,
            scheduler: None,
            replication_enabled,
            network_enabled,
        }
    }

    /// Frame serializer, no-op transport, and a role map defaulting to the
    /// configured viewer role.
    pub fn with_defaults(config: ReplicationConfig) -> Self {
        let roles = Arc::new(DashMapRoleResolver::new(config.default_viewer_role));
        Self::new(config, Arc::new(FrameSerializer::new()), Arc::new(NullTransport), roles)
    }

    /// Replace the priority policy.
    pub fn with_priority_policy(mut self, policy: Arc<dyn PriorityPolicy>) -> Self {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_priority_policy(policy.clone());
        }
        self.priority = policy;
        self
    }

    /// Take the event receiver. Returns `None` after the first call.
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ReplicationEvent>> {
        self.event_rx.take()
    }

    // ===== Lifecycle =====

    /// Build and wire the components. Calling it again is a no-op.
    pub fn initialize(&mut self) {
        if self.is_initialized() {
            tracing::debug!("replication coordinator already initialized");
            return;
        }

        if let Err(e) = self.config.validate() {
            tracing::warn!("initializing with invalid configuration: {}", e);
        }

        let registry = ReplicationRegistry::new(&self.config, self.serializer.clone(), self.events.clone());
        registry.set_replication_enabled(self.replication_enabled);
        let connections = ConnectionTable::new(&self.config, self.transport.clone(), self.events.clone());
        let mut scheduler = ReplicationScheduler::new(&self.config, self.priority.clone(), self.events.clone());
        scheduler.set_replication_enabled(self.replication_enabled);

        self.registry = Some(Arc::new(registry));
        self.connections = Some(Arc::new(connections));
        self.scheduler = Some(scheduler);

        tracing::info!(
            "replication coordinator initialized ({:?}, {} Hz, {} per tick, {}:{})",
            self.config.net_mode,
            self.config.tick_rate,
            self.config.max_replication_per_tick,
            self.config.server_address,
            self.config.server_port
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_some() && self.connections.is_some() && self.scheduler.is_some()
    }

    /// Run one tick: registry pass, then queue drain.
    pub fn update(&mut self, dt: f64) -> TickReport {
        let (Some(registry), Some(connections), Some(scheduler)) =
            (self.registry.as_ref(), self.connections.as_ref(), self.scheduler.as_mut())
        else {
            tracing::warn!("update on uninitialized replication coordinator");
            return TickReport::default();
        };

        let objects_replicated = registry.process_replication(dt);

        let entries_processed = if self.network_enabled {
            scheduler.process_server_replication(dt, registry, connections, self.roles.as_ref())
        } else {
            0
        };

        if self.config.debug {
            tracing::info!(
                "tick dt={:.4}: {} replicated, {} drained, {} queued",
                dt,
                objects_replicated,
                entries_processed,
                scheduler.queue_size()
            );
        }

        TickReport {
            objects_replicated,
            entries_processed,
        }
    }

    /// Disconnect everyone and drop all registrations. Components stay.
    pub fn shutdown(&mut self) {
        if let Some(connections) = &self.connections {
            connections.shutdown_network();
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.reset();
        }
        if let Some(registry) = &self.registry {
            registry.cleanup();
        }
        tracing::info!("replication coordinator shut down");
    }

    /// Reset replication state. Registrations and connections stay.
    pub fn reset(&mut self) {
        if let Some(registry) = &self.registry {
            registry.reset_replication();
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.reset();
        }
        tracing::info!("replication state reset");
    }

    /// Shut down and drop the components.
    pub fn cleanup(&mut self) {
        self.shutdown();
        self.registry = None;
        self.connections = None;
        self.scheduler = None;
        tracing::info!("replication coordinator cleaned up");
    }

    // ===== Components =====

    /// Shared registry handle, for game threads.
    pub fn registry(&self) -> Option<Arc<ReplicationRegistry>> {
        self.registry.clone()
    }

    pub fn connections(&self) -> Option<Arc<ConnectionTable>> {
        self.connections.clone()
    }

    pub fn scheduler(&self) -> Option<&ReplicationScheduler> {
        self.scheduler.as_ref()
    }

    pub fn scheduler_mut(&mut self) -> Option<&mut ReplicationScheduler> {
        self.scheduler.as_mut()
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    fn live_registry(&self) -> Result<&ReplicationRegistry, ReplicationError> {
        self.registry.as_deref().ok_or(ReplicationError::NotInitialized)
    }

    fn live_connections(&self) -> Result<&ConnectionTable, ReplicationError> {
        self.connections.as_deref().ok_or(ReplicationError::NotInitialized)
    }

    // ===== Pass-throughs =====

    pub fn register_object(
        &self,
        entity: EntityHandle,
        policy: ReplicationPolicy,
    ) -> Result<(), ReplicationError> {
        self.live_registry()?.register_object(entity, policy)
    }

    /// Unregister an entity and drop it from the queue.
    pub fn unregister_object(&mut self, entity: &EntityHandle) -> bool {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.remove_from_queue(entity);
        }
        self.registry
            .as_ref()
            .map(|r| r.unregister_object(entity))
            .unwrap_or(false)
    }

    pub fn mark_dirty(&self, entity: &EntityHandle) -> bool {
        self.registry
            .as_ref()
            .map(|r| r.mark_dirty(entity))
            .unwrap_or(false)
    }

    pub fn add_connection(
        &self,
        id: ConnectionId,
        address: impl Into<String>,
        port: u16,
    ) -> Result<(), ReplicationError> {
        self.live_connections()?.add_connection(id, address, port)
    }

    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        self.connections
            .as_ref()
            .map(|c| c.remove_connection(id))
            .unwrap_or(false)
    }

    /// Feed inbound bytes from the transport.
    pub fn receive(&self, id: ConnectionId, payload: Bytes) -> Result<(), ReplicationError> {
        self.live_connections()?.receive(id, payload)
    }

    // ===== Settings =====

    pub fn set_replication_enabled(&mut self, enabled: bool) {
        self.replication_enabled = enabled;
        if let Some(registry) = &self.registry {
            registry.set_replication_enabled(enabled);
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_replication_enabled(enabled);
        }
        tracing::info!("replication {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_replication_enabled(&self) -> bool {
        self.replication_enabled
    }

    /// With the network disabled, updates still run the registry pass but
    /// nothing is sent.
    pub fn set_network_enabled(&mut self, enabled: bool) {
        self.network_enabled = enabled;
        tracing::info!("network {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled
    }

    // ===== Statistics =====

    pub fn total_replicated_objects(&self) -> usize {
        self.registry
            .as_ref()
            .map(|r| r.replicated_object_count())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections
            .as_ref()
            .map(|c| c.connection_count())
            .unwrap_or(0)
    }

    pub fn total_replication_size(&self) -> usize {
        self.registry
            .as_ref()
            .map(|r| r.total_replication_size())
            .unwrap_or(0)
    }

    pub fn replication_load(&self) -> f64 {
        self.scheduler
            .as_ref()
            .map(|s| s.replication_load())
            .unwrap_or(0.0)
    }

    /// `1 - load`, floored at zero.
    pub fn replication_performance(&self) -> f64 {
        (1.0 - self.replication_load()).max(0.0)
    }

    pub fn stats(&self) -> CoordinatorStats {
        let mut stats = CoordinatorStats {
            initialized: self.is_initialized(),
            replication_enabled: self.replication_enabled,
            network_enabled: self.network_enabled,
            replication_load: self.replication_load(),
            replication_performance: self.replication_performance(),
            dropped_events: self.events.dropped(),
            ..Default::default()
        };

        if let Some(registry) = &self.registry {
            stats.replicated_objects = registry.replicated_object_count();
            stats.dirty_objects = registry.dirty_object_count();
            stats.total_replication_size = registry.total_replication_size();
            stats.serialization_errors = registry.error_count();
        }
        if let Some(connections) = &self.connections {
            stats.connections = connections.connection_count();
            stats.bytes_sent = connections.total_bytes_sent();
            stats.bytes_received = connections.total_bytes_received();
        }
        if let Some(scheduler) = &self.scheduler {
            stats.queue_size = scheduler.queue_size();
            stats.scheduler = scheduler.stats().clone();
        }
        stats
    }

    // ===== Validation =====

    /// Collect every component's self-check. Empty means healthy.
    pub fn validate_all_components(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match &self.registry {
            Some(registry) => errors.extend(registry.validate_all_replication()),
            None => errors.push("replication registry is missing".to_string()),
        }

        match &self.connections {
            Some(connections) if !connections.validate_network_settings() => {
                errors.push(format!(
                    "network settings are invalid (port {}, max connections {})",
                    connections.server_port(),
                    connections.max_connections()
                ));
            }
            Some(_) => {}
            None => errors.push("connection table is missing".to_string()),
        }

        match &self.scheduler {
            Some(scheduler) => errors.extend(scheduler.validate_server_replication()),
            None => errors.push("replication scheduler is missing".to_string()),
        }

        errors
    }

    /// [`validate_all_components`] as a `Result`.
    ///
    /// [`validate_all_components`]: ReplicationCoordinator::validate_all_components
    pub fn validate_system(&self) -> Result<(), ReplicationError> {
        let errors = self.validate_all_components();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReplicationError::Validation(errors))
        }
    }
}
