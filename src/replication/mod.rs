//! Replication Module
//!
//! Tick-driven replication of entity state to remote connections.
//!
//! ## Architecture
//!
//! - **Registry**: entity → replication state, dirty set, simulation clock
//! - **Connections**: active peers, admission control, byte accounting
//! - **Scheduler**: budgeted priority queue, role-filtered fan-out
//! - **Coordinator**: owns the three and drives them once per tick
//!
//! ## How It Works
//!
//! 1. Game logic registers entities and marks them dirty when they change
//! 2. Each `update(dt)` advances the clock and serializes every entity that
//!    is dirty or due for a heartbeat
//! 3. Fresh payloads are queued by priority and drained up to the per-tick
//!    budget; leftovers wait for the next tick
//! 4. Each drained payload goes to every connection whose role passes the
//!    entity's replication condition
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replication_core::{EntityHandle, ReplicationConfig, ReplicationCoordinator, ReplicationPolicy};
//!
//! let mut coordinator = ReplicationCoordinator::with_defaults(ReplicationConfig::default());
//! coordinator.initialize();
//!
//! let player = EntityHandle::new("Player_1");
//! coordinator.register_object(player.clone(), ReplicationPolicy::new(10.0))?;
//! coordinator.mark_dirty(&player);
//! coordinator.update(1.0 / 60.0);
//! ```

mod connections;
mod coordinator;
pub mod frame;
mod registry;
mod scheduler;

pub use connections::{ConnectionTable, MIN_SERVER_PORT};
pub use coordinator::{CoordinatorStats, ReplicationCoordinator, TickReport};
pub use frame::{decode_frame, decode_length, encode_frame, FrameError, ReplicationFrame, LENGTH_PREFIX};
pub use registry::ReplicationRegistry;
pub use scheduler::{ReplicationScheduler, SchedulerStats};
