//! Channel Transport
//!
//! Implements Transport by forwarding payloads into a bounded channel that
//! an async socket writer drains.

use crate::domain::ports::{Transport, TransportError};
use crate::domain::value_objects::ConnectionId;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A payload waiting to be written to a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPayload {
    pub connection: ConnectionId,
    pub payload: Bytes,
}

/// Channel-backed transport.
///
/// `send` never waits: a full channel rejects the payload, which the
/// scheduler counts as a replication error.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<OutboundPayload>,
}

impl ChannelTransport {
    /// Create the transport and the receiver the writer task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundPayload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, connection: ConnectionId, payload: Bytes) -> Result<(), TransportError> {
        self.tx
            .try_send(OutboundPayload {
                connection,
                payload,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Rejected("outbound queue full".to_string()),
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }
}

/// Transport that accepts and discards every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _connection: ConnectionId, _payload: Bytes) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (transport, mut rx) = ChannelTransport::new(4);
        transport
            .send(ConnectionId(1), Bytes::from_static(b"hello"))
            .unwrap();

        let out = rx.recv().await.unwrap();
        assert_eq!(out.connection, ConnectionId(1));
        assert_eq!(&out.payload[..], b"hello");
    }

    #[test]
    fn test_full_channel_rejects() {
        let (transport, _rx) = ChannelTransport::new(1);
        transport.send(ConnectionId(1), Bytes::from_static(b"a")).unwrap();

        let result = transport.send(ConnectionId(1), Bytes::from_static(b"b"));
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }

    #[test]
    fn test_closed_channel() {
        let (transport, rx) = ChannelTransport::new(1);
        drop(rx);

        let result = transport.send(ConnectionId(1), Bytes::from_static(b"a"));
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[test]
    fn test_null_transport_accepts() {
        assert!(NullTransport.send(ConnectionId(9), Bytes::new()).is_ok());
    }
}
