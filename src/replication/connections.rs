//! Connection Table
//!
//! Tracks active peer connections, enforces the connection limit, and hands
//! payloads to the injected transport with per-connection byte accounting.

use crate::config::ReplicationConfig;
use crate::domain::entities::Connection;
use crate::domain::error::ReplicationError;
use crate::domain::events::{EventSink, ReplicationEvent};
use crate::domain::ports::Transport;
use crate::domain::value_objects::{ConnectionId, NetMode};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lowest port accepted for the listening endpoint.
pub const MIN_SERVER_PORT: u16 = 1024;

/// Per-connection state.
struct ConnectionEntry {
    id: ConnectionId,
    address: String,
    port: u16,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    latency: Mutex<Option<Duration>>,
}

impl ConnectionEntry {
    fn new(id: ConnectionId, address: String, port: u16) -> Self {
        Self {
            id,
            address,
            port,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            latency: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Connection {
        Connection {
            id: self.id,
            address: self.address.clone(),
            port: self.port,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            latency: *self.latency.lock(),
        }
    }
}

/// Listening endpoint and role of this peer.
#[derive(Debug, Clone)]
struct NetworkSettings {
    address: String,
    port: u16,
    mode: NetMode,
}

/// Table of active connections.
///
/// Add and remove take the write lock; fan-out sends iterate a snapshot
/// taken under the read lock, so they never observe a half-updated table.
pub struct ConnectionTable {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionEntry>>>,
    settings: RwLock<NetworkSettings>,
    max_connections: AtomicUsize,
    transport: Arc<dyn Transport>,
    events: EventSink,
    total_sent: AtomicU64,
    total_received: AtomicU64,
}

impl ConnectionTable {
    /// Create an empty table.
    pub fn new(config: &ReplicationConfig, transport: Arc<dyn Transport>, events: EventSink) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            settings: RwLock::new(NetworkSettings {
                address: config.server_address.clone(),
                port: config.server_port,
                mode: config.net_mode,
            }),
            max_connections: AtomicUsize::new(config.max_connections),
            transport,
            events,
            total_sent: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
        }
    }

    // ===== Admission =====

    /// Admit a connection.
    pub fn add_connection(
        &self,
        id: ConnectionId,
        address: impl Into<String>,
        port: u16,
    ) -> Result<(), ReplicationError> {
        let address = address.into();
        if address.is_empty() {
            tracing::warn!("rejecting {}: empty address", id);
            return Err(ReplicationError::InvalidArgument(format!(
                "empty address for {}",
                id
            )));
        }

        let max = self.max_connections.load(Ordering::Relaxed);
        {
            let mut connections = self.connections.write();
            if connections.contains_key(&id) {
                tracing::warn!("rejecting {}: already connected", id);
                return Err(ReplicationError::InvalidArgument(format!(
                    "connection already exists: {}",
                    id
                )));
            }
            if connections.len() >= max {
                tracing::warn!("rejecting {} from {}:{}: connection limit {} reached", id, address, port, max);
                return Err(ReplicationError::CapacityExceeded { max });
            }
            connections.insert(id, Arc::new(ConnectionEntry::new(id, address.clone(), port)));
        }

        tracing::info!("connection opened: {} ({}:{})", id, address, port);
        self.events.emit(ReplicationEvent::ConnectionOpened(id));
        Ok(())
    }

    /// Remove a connection. Returns false if it was unknown.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id);
        match removed {
            Some(entry) => {
                tracing::info!("connection closed: {} ({}:{})", id, entry.address, entry.port);
                self.events.emit(ReplicationEvent::ConnectionClosed(id));
                true
            }
            None => false,
        }
    }

    /// Remove every connection.
    pub fn disconnect_all(&self) -> usize {
        let ids = self.connection_ids();
        ids.into_iter().filter(|id| self.remove_connection(*id)).count()
    }

    /// Disconnect everyone and zero the byte counters.
    pub fn shutdown_network(&self) {
        let closed = self.disconnect_all();
        self.total_sent.store(0, Ordering::Relaxed);
        self.total_received.store(0, Ordering::Relaxed);
        tracing::info!("network shut down, {} connections closed", closed);
    }

    // ===== Sending =====

    /// Hand a payload to the transport for one connection.
    ///
    /// Returns the number of bytes accepted. Bytes are only counted once
    /// the transport accepts the payload.
    pub fn send(&self, id: ConnectionId, payload: Bytes) -> Result<usize, ReplicationError> {
        let Some(entry) = self.entry(id) else {
            tracing::warn!("send to unknown connection {}", id);
            return Err(ReplicationError::UnknownConnection(id));
        };

        let len = payload.len();
        match self.transport.send(id, payload) {
            Ok(()) => {
                entry.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
                self.total_sent.fetch_add(len as u64, Ordering::Relaxed);
                tracing::debug!("sent {} bytes to {}", len, id);
                Ok(len)
            }
            Err(e) => {
                tracing::error!("transport rejected {} bytes for {}: {}", len, id, e);
                Err(ReplicationError::Transport {
                    connection: id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Send to every connection. Returns how many accepted the payload.
    pub fn send_to_all(&self, payload: Bytes) -> usize {
        self.fan_out(payload, None)
    }

    /// Send to every connection except `except`.
    pub fn send_to_all_except(&self, except: ConnectionId, payload: Bytes) -> usize {
        self.fan_out(payload, Some(except))
    }

    /// Same as [`ConnectionTable::send_to_all`].
    pub fn broadcast(&self, payload: Bytes) -> usize {
        self.fan_out(payload, None)
    }

    fn fan_out(&self, payload: Bytes, except: Option<ConnectionId>) -> usize {
        self.connection_ids()
            .into_iter()
            .filter(|id| Some(*id) != except)
            .filter(|id| self.send(*id, payload.clone()).is_ok())
            .count()
    }

    // ===== Receiving =====

    /// Account for bytes that arrived from a connection and notify the host.
    pub fn receive(&self, id: ConnectionId, payload: Bytes) -> Result<(), ReplicationError> {
        let Some(entry) = self.entry(id) else {
            tracing::warn!("data from unknown connection {}", id);
            return Err(ReplicationError::UnknownConnection(id));
        };

        let len = payload.len() as u64;
        entry.bytes_received.fetch_add(len, Ordering::Relaxed);
        self.total_received.fetch_add(len, Ordering::Relaxed);
        tracing::debug!("received {} bytes from {}", len, id);

        self.events.emit(ReplicationEvent::DataReceived {
            connection: id,
            payload,
        });
        Ok(())
    }

    /// Store the round-trip time reported by the transport.
    pub fn record_latency(&self, id: ConnectionId, rtt: Duration) -> bool {
        match self.entry(id) {
            Some(entry) => {
                *entry.latency.lock() = Some(rtt);
                true
            }
            None => false,
        }
    }

    /// Last reported round-trip time.
    pub fn latency(&self, id: ConnectionId) -> Option<Duration> {
        self.entry(id).and_then(|e| *e.latency.lock())
    }

    // ===== Queries =====

    fn entry(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.connections.read().get(&id).cloned()
    }

    pub fn has_connection(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Active connection ids, ascending.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Snapshot of one connection.
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.entry(id).map(|e| e.snapshot())
    }

    /// Snapshot of every connection, ascending by id.
    pub fn connections(&self) -> Vec<Connection> {
        let mut all: Vec<Connection> = self
            .connections
            .read()
            .values()
            .map(|e| e.snapshot())
            .collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    pub fn total_bytes_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    // ===== Settings =====

    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Relaxed)
    }

    /// Change the limit. Existing connections above it are kept.
    pub fn set_max_connections(&self, max: usize) {
        self.max_connections.store(max, Ordering::Relaxed);
    }

    pub fn server_address(&self) -> String {
        self.settings.read().address.clone()
    }

    pub fn server_port(&self) -> u16 {
        self.settings.read().port
    }

    pub fn set_server(&self, address: impl Into<String>, port: u16) {
        let mut settings = self.settings.write();
        settings.address = address.into();
        settings.port = port;
    }

    pub fn net_mode(&self) -> NetMode {
        self.settings.read().mode
    }

    pub fn set_net_mode(&self, mode: NetMode) {
        self.settings.write().mode = mode;
    }

    pub fn is_server(&self) -> bool {
        self.net_mode().is_server()
    }

    pub fn is_client(&self) -> bool {
        self.net_mode().is_client()
    }

    // ===== Validation =====

    /// The connection exists and has a usable endpoint.
    pub fn validate_connection(&self, id: ConnectionId) -> bool {
        self.entry(id)
            .map(|e| !e.address.is_empty() && e.port != 0)
            .unwrap_or(false)
    }

    /// Listening port in `1024..=65535` and a non-zero connection limit.
    pub fn validate_network_settings(&self) -> bool {
        self.server_port() >= MIN_SERVER_PORT && self.max_connections() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{ChannelTransport, NullTransport};
    use crate::domain::ports::TransportError;
    use tracing_test::traced_test;

    struct RejectingTransport;

    impl Transport for RejectingTransport {
        fn send(&self, _connection: ConnectionId, _payload: Bytes) -> Result<(), TransportError> {
            Err(TransportError::Rejected("backpressure".into()))
        }
    }

    fn table(max: usize) -> ConnectionTable {
        ConnectionTable::new(
            &ReplicationConfig::default().max_connections(max),
            Arc::new(NullTransport),
            EventSink::disabled(),
        )
    }

    #[test]
    fn test_add_and_remove() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "10.0.0.1", 5000).unwrap();
        assert!(t.has_connection(ConnectionId(1)));
        assert_eq!(t.connection_count(), 1);

        assert!(t.remove_connection(ConnectionId(1)));
        assert!(!t.remove_connection(ConnectionId(1)));
        assert_eq!(t.connection_count(), 0);
    }

    #[test]
    #[traced_test]
    fn test_admission_control() {
        let t = table(2);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();
        t.add_connection(ConnectionId(2), "b", 2).unwrap();

        let result = t.add_connection(ConnectionId(3), "c", 3);
        assert_eq!(result, Err(ReplicationError::CapacityExceeded { max: 2 }));
        assert_eq!(t.connection_count(), 2);
        assert!(logs_contain("connection limit 2 reached"));

        t.remove_connection(ConnectionId(1));
        assert!(t.add_connection(ConnectionId(3), "c", 3).is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_address_rejected() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();
        assert!(matches!(
            t.add_connection(ConnectionId(1), "b", 2),
            Err(ReplicationError::InvalidArgument(_))
        ));
        assert!(matches!(
            t.add_connection(ConnectionId(2), "", 2),
            Err(ReplicationError::InvalidArgument(_))
        ));
        assert_eq!(t.connection(ConnectionId(1)).unwrap().address, "a");
    }

    #[test]
    fn test_send_accounts_bytes() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();

        assert_eq!(t.send(ConnectionId(1), Bytes::from_static(b"hello")), Ok(5));
        assert_eq!(t.connection(ConnectionId(1)).unwrap().bytes_sent, 5);
        assert_eq!(t.total_bytes_sent(), 5);
    }

    #[test]
    fn test_send_unknown_connection() {
        let t = table(4);
        let result = t.send(ConnectionId(9), Bytes::from_static(b"x"));
        assert_eq!(result, Err(ReplicationError::UnknownConnection(ConnectionId(9))));
        assert_eq!(t.total_bytes_sent(), 0);
    }

    #[test]
    fn test_rejected_send_not_counted() {
        let t = ConnectionTable::new(
            &ReplicationConfig::default(),
            Arc::new(RejectingTransport),
            EventSink::disabled(),
        );
        t.add_connection(ConnectionId(1), "a", 1).unwrap();

        let result = t.send(ConnectionId(1), Bytes::from_static(b"abc"));
        assert!(matches!(result, Err(ReplicationError::Transport { .. })));
        assert_eq!(t.total_bytes_sent(), 0);
        assert_eq!(t.connection(ConnectionId(1)).unwrap().bytes_sent, 0);
    }

    #[test]
    fn test_fan_out() {
        let (transport, mut rx) = ChannelTransport::new(16);
        let t = ConnectionTable::new(
            &ReplicationConfig::default(),
            Arc::new(transport),
            EventSink::disabled(),
        );
        for id in 1..=3 {
            t.add_connection(ConnectionId(id), "peer", 7000).unwrap();
        }

        assert_eq!(t.send_to_all(Bytes::from_static(b"all")), 3);
        assert_eq!(t.send_to_all_except(ConnectionId(2), Bytes::from_static(b"x")), 2);
        assert_eq!(t.broadcast(Bytes::from_static(b"b")), 3);

        let mut targets = Vec::new();
        while let Ok(out) = rx.try_recv() {
            targets.push(out.connection.get());
        }
        assert_eq!(targets, vec![1, 2, 3, 1, 3, 1, 2, 3]);
    }

    #[test]
    fn test_receive_emits_event() {
        let (events, mut rx) = EventSink::channel(8);
        let t = ConnectionTable::new(&ReplicationConfig::default(), Arc::new(NullTransport), events);
        t.add_connection(ConnectionId(4), "a", 1).unwrap();
        let _ = rx.try_recv(); // opened

        t.receive(ConnectionId(4), Bytes::from_static(b"ping")).unwrap();
        assert_eq!(t.total_bytes_received(), 4);
        match rx.try_recv() {
            Ok(ReplicationEvent::DataReceived { connection, payload }) => {
                assert_eq!(connection, ConnectionId(4));
                assert_eq!(&payload[..], b"ping");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(t.receive(ConnectionId(5), Bytes::new()).is_err());
    }

    #[test]
    fn test_open_close_events() {
        let (events, mut rx) = EventSink::channel(8);
        let t = ConnectionTable::new(&ReplicationConfig::default(), Arc::new(NullTransport), events);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();
        t.remove_connection(ConnectionId(1));
        t.remove_connection(ConnectionId(1));

        assert!(matches!(rx.try_recv(), Ok(ReplicationEvent::ConnectionOpened(ConnectionId(1)))));
        assert!(matches!(rx.try_recv(), Ok(ReplicationEvent::ConnectionClosed(ConnectionId(1)))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_latency() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();
        assert_eq!(t.latency(ConnectionId(1)), None);

        assert!(t.record_latency(ConnectionId(1), Duration::from_millis(42)));
        assert_eq!(t.latency(ConnectionId(1)), Some(Duration::from_millis(42)));
        assert!(!t.record_latency(ConnectionId(2), Duration::from_millis(1)));
    }

    #[test]
    fn test_network_settings_validation() {
        let t = table(4);
        assert!(t.validate_network_settings());
        assert_eq!(t.server_address(), "127.0.0.1");
        assert_eq!(t.server_port(), 7777);

        t.set_server("0.0.0.0", 80);
        assert!(!t.validate_network_settings());

        t.set_server("0.0.0.0", 65535);
        t.set_max_connections(0);
        assert!(!t.validate_network_settings());
    }

    #[test]
    fn test_validate_connection() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "a", 0).unwrap();
        t.add_connection(ConnectionId(2), "b", 9000).unwrap();
        assert!(!t.validate_connection(ConnectionId(1)));
        assert!(t.validate_connection(ConnectionId(2)));
        assert!(!t.validate_connection(ConnectionId(3)));
    }

    #[test]
    fn test_net_mode() {
        let t = table(4);
        assert!(!t.is_server());
        t.set_net_mode(NetMode::ListenServer);
        assert!(t.is_server());
        assert!(t.is_client());
    }

    #[test]
    fn test_shutdown_network() {
        let t = table(4);
        t.add_connection(ConnectionId(1), "a", 1).unwrap();
        t.add_connection(ConnectionId(2), "b", 1).unwrap();
        t.send_to_all(Bytes::from_static(b"xyz"));

        t.shutdown_network();
        assert_eq!(t.connection_count(), 0);
        assert_eq!(t.total_bytes_sent(), 0);
    }

    #[test]
    fn test_concurrent_add_remove_during_fan_out() {
        let t = Arc::new(table(1000));
        for id in 0..100 {
            t.add_connection(ConnectionId(id), "peer", 7000).unwrap();
        }

        let churn = {
            let t = t.clone();
            std::thread::spawn(move || {
                for id in 100..300 {
                    let _ = t.add_connection(ConnectionId(id), "peer", 7000);
                    t.remove_connection(ConnectionId(id - 100));
                }
            })
        };

        for _ in 0..50 {
            let sent = t.send_to_all(Bytes::from_static(b"tick"));
            assert!(sent <= 1000);
        }
        churn.join().unwrap();

        assert_eq!(t.connection_count(), 100);
    }
}
