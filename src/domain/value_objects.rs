//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// How an entity's updates are delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryKind {
    /// Not replicated at all
    None,
    /// Ordered, acknowledged delivery
    Reliable,
    /// Fire-and-forget delivery
    #[default]
    Unreliable,
    /// Reliable, only while a level/session is loading
    ReliableOnLoad,
    /// Reliable, only while a replay is being recorded or played
    ReliableOnReplay,
}

impl DeliveryKind {
    /// Parse a delivery kind from a string.
    ///
    /// Unknown values fall back to [`DeliveryKind::Unreliable`].
    ///
    /// # Examples
    /// ```
    /// use replication_core::domain::value_objects::DeliveryKind;
    ///
    /// assert_eq!(DeliveryKind::from_str("reliable"), DeliveryKind::Reliable);
    /// assert_eq!(DeliveryKind::from_str("bogus"), DeliveryKind::Unreliable);
    /// ```
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "reliable" => Self::Reliable,
            "unreliable" => Self::Unreliable,
            "reliable_on_load" => Self::ReliableOnLoad,
            "reliable_on_replay" => Self::ReliableOnReplay,
            _ => Self::Unreliable,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reliable => "reliable",
            Self::Unreliable => "unreliable",
            Self::ReliableOnLoad => "reliable_on_load",
            Self::ReliableOnReplay => "reliable_on_replay",
        }
    }

    /// Whether the transport is expected to acknowledge delivery.
    pub fn is_reliable(&self) -> bool {
        matches!(
            self,
            Self::Reliable | Self::ReliableOnLoad | Self::ReliableOnReplay
        )
    }
}

impl std::fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility condition selecting which viewers receive an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicationCondition {
    /// Every viewer
    #[default]
    None,
    /// Only until the first successful send
    InitialOnly,
    /// Only the owning (authority) viewer
    OwnerOnly,
    /// Everyone except the owning viewer
    SkipOwner,
    /// Only simulated proxies
    SimulatedOnly,
    /// Only autonomous proxies
    AutonomousOnly,
    /// Simulated proxies and the authority
    SimulatedOrPhysics,
    /// Initial send to everyone, afterwards only the owner
    InitialOrOwner,
    /// Caller-defined; treated as always visible
    Custom,
}

impl ReplicationCondition {
    /// All conditions, in declaration order.
    pub const ALL: [ReplicationCondition; 9] = [
        Self::None,
        Self::InitialOnly,
        Self::OwnerOnly,
        Self::SkipOwner,
        Self::SimulatedOnly,
        Self::AutonomousOnly,
        Self::SimulatedOrPhysics,
        Self::InitialOrOwner,
        Self::Custom,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InitialOnly => "initial_only",
            Self::OwnerOnly => "owner_only",
            Self::SkipOwner => "skip_owner",
            Self::SimulatedOnly => "simulated_only",
            Self::AutonomousOnly => "autonomous_only",
            Self::SimulatedOrPhysics => "simulated_or_physics",
            Self::InitialOrOwner => "initial_or_owner",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ReplicationCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship of a viewer (or an entity) to the replicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetRole {
    /// No role assigned
    None,
    /// Remote copy driven purely by replicated state
    #[default]
    SimulatedProxy,
    /// Remote copy that also predicts locally (the controlling client)
    AutonomousProxy,
    /// Owner of the authoritative state
    Authority,
}

impl NetRole {
    /// All roles, in declaration order.
    pub const ALL: [NetRole; 4] = [
        Self::None,
        Self::SimulatedProxy,
        Self::AutonomousProxy,
        Self::Authority,
    ];

    /// Parse a role from a string. Unknown values map to `None`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "simulated" | "simulated_proxy" => Self::SimulatedProxy,
            "autonomous" | "autonomous_proxy" => Self::AutonomousProxy,
            "authority" => Self::Authority,
            _ => Self::None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SimulatedProxy => "simulated_proxy",
            Self::AutonomousProxy => "autonomous_proxy",
            Self::Authority => "authority",
        }
    }
}

impl std::fmt::Display for NetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Network mode of the local process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetMode {
    #[default]
    Standalone,
    DedicatedServer,
    ListenServer,
    Client,
}

impl NetMode {
    /// Whether this process accepts remote viewers.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::DedicatedServer | Self::ListenServer)
    }

    /// Whether this process is connected to a remote server.
    pub fn is_client(&self) -> bool {
        matches!(self, Self::Client | Self::ListenServer)
    }
}

/// Identifier of an active remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ConnectionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
