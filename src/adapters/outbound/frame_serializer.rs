//! Frame Serializer
//!
//! Implements EntitySerializer by wrapping entity state in length-prefixed
//! replication frames.

use crate::domain::entities::ReplicatedEntity;
use crate::domain::ports::{EntitySerializer, SerializeError};
use crate::replication::frame::{encode_frame, ReplicationFrame};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the game-defined body bytes for an entity.
pub type BodyEncoder =
    Box<dyn Fn(&ReplicatedEntity) -> Result<Vec<u8>, SerializeError> + Send + Sync>;

/// Frame-based serializer.
///
/// Without a body encoder the frame only identifies the entity, which is
/// enough for heartbeats and tests.
pub struct FrameSerializer {
    sequence: AtomicU64,
    body: Option<BodyEncoder>,
}

impl FrameSerializer {
    /// Create a serializer that emits empty-bodied frames.
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            body: None,
        }
    }

    /// Create a serializer with a caller-supplied body encoder.
    pub fn with_body<F>(encoder: F) -> Self
    where
        F: Fn(&ReplicatedEntity) -> Result<Vec<u8>, SerializeError> + Send + Sync + 'static,
    {
        Self {
            sequence: AtomicU64::new(0),
            body: Some(Box::new(encoder)),
        }
    }

    /// Number of frames produced so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for FrameSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitySerializer for FrameSerializer {
    fn serialize(&self, entity: &ReplicatedEntity) -> Result<Bytes, SerializeError> {
        let body = match &self.body {
            Some(encode) => encode(entity)?,
            None => Vec::new(),
        };

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = ReplicationFrame::new(entity.handle.name(), seq, entity.policy.delivery, body);

        encode_frame(&frame).map_err(|e| SerializeError(e.to_string()))
    }
}
