//! Replication Core Library
//!
//! Server-authoritative replication of entity state to remote peers: dirty
//! tracking, heartbeat scheduling, role-based visibility and a budgeted
//! per-tick send queue.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod replication;

// Re-export commonly used types
pub use adapters::outbound::{ChannelTransport, DashMapRoleResolver, FrameSerializer, NullTransport};
pub use config::{load_config, ConfigError, ReplicationConfig};
pub use domain::entities::{Connection, EntityHandle, ReplicatedEntity, ReplicationPolicy};
pub use domain::error::ReplicationError;
pub use domain::events::{EventSink, ReplicationEvent};
pub use domain::ports::{EntitySerializer, PriorityPolicy, RoleResolver, Transport};
pub use domain::services::{can_replicate_to, NameHashPriority};
pub use domain::value_objects::{ConnectionId, DeliveryKind, NetMode, NetRole, ReplicationCondition};
pub use replication::{ConnectionTable, ReplicationCoordinator, ReplicationRegistry, ReplicationScheduler};
