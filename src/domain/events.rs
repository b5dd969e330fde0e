//! Replication Events
//!
//! Notifications are pushed onto an outbound queue that the host drains,
//! instead of being delivered through stored callbacks.

use crate::domain::entities::EntityHandle;
use crate::domain::value_objects::ConnectionId;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Events emitted synchronously during a tick.
#[derive(Debug, Clone)]
pub enum ReplicationEvent {
    /// A fresh payload was produced for an entity
    ObjectReplicated(EntityHandle),
    /// Serialization or delivery failed for an entity
    ReplicationError { entity: EntityHandle, reason: String },
    /// An entity's payload was handed to a connection
    ActorReplicated {
        entity: EntityHandle,
        connection: ConnectionId,
    },
    /// A connection was admitted
    ConnectionOpened(ConnectionId),
    /// A connection was removed
    ConnectionClosed(ConnectionId),
    /// Bytes arrived from a connection
    DataReceived {
        connection: ConnectionId,
        payload: Bytes,
    },
}

/// Sending half of the event queue, shared by all components.
///
/// Emitting never blocks: when the queue is full the event is dropped and
/// counted.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ReplicationEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Create a bounded event queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReplicationEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Push an event without waiting.
    pub fn emit(&self, event: ReplicationEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                // receiver gone, host is not listening
            }
        }
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_receive() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(1)));
        sink.emit(ReplicationEvent::ConnectionClosed(ConnectionId(1)));

        assert!(matches!(rx.try_recv(), Ok(ReplicationEvent::ConnectionOpened(ConnectionId(1)))));
        assert!(matches!(rx.try_recv(), Ok(ReplicationEvent::ConnectionClosed(ConnectionId(1)))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops() {
        let (sink, _rx) = EventSink::channel(1);
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(1)));
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(2)));
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(3)));

        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(1)));
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);
        sink.emit(ReplicationEvent::ConnectionOpened(ConnectionId(1)));
        assert_eq!(sink.dropped(), 0);
    }
}
