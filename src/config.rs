//! Replication Configuration
//!
//! Settings for the replication core, loadable from the environment.

use crate::domain::value_objects::{NetMode, NetRole};
use serde::Deserialize;
use std::str::FromStr;

/// Configuration for a replication coordinator.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Server replication tick rate in Hz (default: 60)
    pub tick_rate: f64,

    /// Queue entries drained per tick (default: 100)
    pub max_replication_per_tick: usize,

    /// Maximum concurrent connections (default: 100)
    pub max_connections: usize,

    /// Address the server advertises (default: 127.0.0.1)
    pub server_address: String,

    /// Port the server advertises (default: 7777)
    pub server_port: u16,

    /// Network mode of this process (default: standalone)
    pub net_mode: NetMode,

    /// Frequency given to entities registered with the default policy (default: 1 Hz)
    pub global_replication_frequency: f64,

    /// Largest payload accepted from the serializer, in bytes (default: 1024)
    pub max_replication_size: usize,

    /// Capacity of the outbound event queue (default: 1024)
    pub event_capacity: usize,

    /// Role assumed for connections the game layer has not classified
    pub default_viewer_role: NetRole,

    /// Registry processing switch (default: true)
    pub replication_enabled: bool,

    /// Scheduler/network processing switch (default: true)
    pub network_enabled: bool,

    /// Log a per-tick summary (default: false)
    pub debug: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_replication_per_tick: 100,
            max_connections: 100,
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            net_mode: NetMode::Standalone,
            global_replication_frequency: 1.0,
            max_replication_size: 1024,
            event_capacity: 1024,
            default_viewer_role: NetRole::SimulatedProxy,
            replication_enabled: true,
            network_enabled: true,
            debug: false,
        }
    }
}

impl ReplicationConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick rate.
    pub fn tick_rate(mut self, hz: f64) -> Self {
        self.tick_rate = hz;
        self
    }

    /// Set the per-tick drain budget.
    pub fn max_replication_per_tick(mut self, budget: usize) -> Self {
        self.max_replication_per_tick = budget;
        self
    }

    /// Set the connection limit.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the advertised server endpoint.
    pub fn server(mut self, address: impl Into<String>, port: u16) -> Self {
        self.server_address = address.into();
        self.server_port = port;
        self
    }

    /// Set the network mode.
    pub fn net_mode(mut self, mode: NetMode) -> Self {
        self.net_mode = mode;
        self
    }

    /// Set the largest accepted payload.
    pub fn max_replication_size(mut self, bytes: usize) -> Self {
        self.max_replication_size = bytes;
        self
    }

    /// Set the event queue capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the role used for unclassified connections.
    pub fn default_viewer_role(mut self, role: NetRole) -> Self {
        self.default_viewer_role = role;
        self
    }

    /// Seconds between two scheduler ticks.
    pub fn tick_interval(&self) -> f64 {
        1.0 / self.tick_rate
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if self.max_replication_per_tick == 0 {
            return Err(ConfigError::ZeroReplicationBudget);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        if self.server_port < 1024 {
            return Err(ConfigError::InvalidPort(self.server_port));
        }
        if !(self.global_replication_frequency.is_finite() && self.global_replication_frequency > 0.0) {
            return Err(ConfigError::InvalidFrequency(self.global_replication_frequency));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("tick_rate must be > 0 (got {0})")]
    InvalidTickRate(f64),
    #[error("max_replication_per_tick must be > 0")]
    ZeroReplicationBudget,
    #[error("max_connections must be > 0")]
    ZeroMaxConnections,
    #[error("server_port must be in 1024..=65535 (got {0})")]
    InvalidPort(u16),
    #[error("global_replication_frequency must be > 0 (got {0})")]
    InvalidFrequency(f64),
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

/// Load configuration from `REPLICATION_*` environment variables.
///
/// Unparseable values fall back to their defaults; the resulting
/// configuration is validated.
pub fn load_config() -> anyhow::Result<ReplicationConfig> {
    let defaults = ReplicationConfig::default();

    let net_mode = match std::env::var("REPLICATION_NET_MODE")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "dedicated" | "dedicated_server" => NetMode::DedicatedServer,
        "listen" | "listen_server" => NetMode::ListenServer,
        "client" => NetMode::Client,
        _ => defaults.net_mode,
    };

    let default_viewer_role = std::env::var("REPLICATION_DEFAULT_VIEWER_ROLE")
        .map(|v| NetRole::from_str(&v))
        .unwrap_or(defaults.default_viewer_role);

    let cfg = ReplicationConfig {
        tick_rate: env_or("REPLICATION_TICK_RATE", defaults.tick_rate),
        max_replication_per_tick: env_or(
            "REPLICATION_MAX_PER_TICK",
            defaults.max_replication_per_tick,
        ),
        max_connections: env_or("REPLICATION_MAX_CONNECTIONS", defaults.max_connections),
        server_address: std::env::var("REPLICATION_SERVER_ADDRESS")
            .unwrap_or(defaults.server_address),
        server_port: env_or("REPLICATION_SERVER_PORT", defaults.server_port),
        net_mode,
        global_replication_frequency: env_or(
            "REPLICATION_GLOBAL_FREQUENCY",
            defaults.global_replication_frequency,
        ),
        max_replication_size: env_or("REPLICATION_MAX_PAYLOAD_SIZE", defaults.max_replication_size),
        event_capacity: env_or("REPLICATION_EVENT_CAPACITY", defaults.event_capacity),
        default_viewer_role,
        replication_enabled: env_flag("REPLICATION_ENABLED", defaults.replication_enabled),
        network_enabled: env_flag("REPLICATION_NETWORK_ENABLED", defaults.network_enabled),
        debug: std::env::var("DEBUG").is_ok(),
    };

    cfg.validate()?;
    Ok(cfg)
}
