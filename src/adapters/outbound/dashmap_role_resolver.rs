//! DashMap Role Resolver
//!
//! Implements RoleResolver using DashMap for lock-free concurrent access.

use crate::domain::ports::RoleResolver;
use crate::domain::value_objects::{ConnectionId, NetRole};
use dashmap::DashMap;

/// DashMap-backed connection → viewer role map.
///
/// Game logic assigns roles from any thread; connections without an entry
/// resolve to the default role.
pub struct DashMapRoleResolver {
    roles: DashMap<ConnectionId, NetRole>,
    default_role: NetRole,
}

impl DashMapRoleResolver {
    /// Create a resolver with the given fallback role.
    pub fn new(default_role: NetRole) -> Self {
        Self {
            roles: DashMap::new(),
            default_role,
        }
    }

    /// Assign a role to a connection.
    pub fn set_role(&self, connection: ConnectionId, role: NetRole) {
        self.roles.insert(connection, role);
    }

    /// Forget a connection's role.
    pub fn clear_role(&self, connection: ConnectionId) {
        self.roles.remove(&connection);
    }

    /// Forget every role.
    pub fn clear(&self) {
        self.roles.clear();
    }

    /// Role given to unclassified connections.
    pub fn default_role(&self) -> NetRole {
        self.default_role
    }

    /// Number of explicitly classified connections.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Default for DashMapRoleResolver {
    fn default() -> Self {
        Self::new(NetRole::SimulatedProxy)
    }
}

impl RoleResolver for DashMapRoleResolver {
    fn role_for(&self, connection: ConnectionId) -> NetRole {
        self.roles
            .get(&connection)
            .map(|r| *r.value())
            .unwrap_or(self.default_role)
    }
}
