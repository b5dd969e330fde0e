//! Role Resolver Port
//!
//! Maps a connection to the net role its viewer holds.

use crate::domain::value_objects::{ConnectionId, NetRole};

/// Resolves the viewer role of a connection.
///
/// Roles are not stored on connections in the core; the game layer
/// decides who owns what and answers through this port.
pub trait RoleResolver: Send + Sync {
    /// Role of the viewer behind `connection`.
    fn role_for(&self, connection: ConnectionId) -> NetRole;
}
