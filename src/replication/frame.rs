//! Replication Frame Codec
//!
//! Length-prefixed binary frames carrying one entity update.
//!
//! Sans-IO: encoding and decoding never touch a socket, so transports can
//! reuse them on whatever I/O they run.
//!
//! Layout: `[u32 big-endian length][bincode(ReplicationFrame)]`.

use crate::domain::value_objects::DeliveryKind;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// One replicated entity update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationFrame {
    /// Entity name
    pub entity: String,
    /// Per-serializer sequence number
    pub sequence: u64,
    /// Delivery kind requested for this update
    pub delivery: DeliveryKind,
    /// Game-defined state bytes
    pub body: Vec<u8>,
    /// CRC32 of `body`
    pub checksum: u32,
}

impl ReplicationFrame {
    /// Create a frame and compute its checksum.
    pub fn new(entity: impl Into<String>, sequence: u64, delivery: DeliveryKind, body: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&body);
        Self {
            entity: entity.into(),
            sequence,
            delivery,
            body,
            checksum,
        }
    }

    /// Verify the checksum.
    pub fn verify(&self) -> bool {
        self.checksum == crc32fast::hash(&self.body)
    }
}

/// Frame codec errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Encode a frame into a length-prefixed buffer.
pub fn encode_frame(frame: &ReplicationFrame) -> Result<Bytes, FrameError> {
    let data = bincode::serialize(frame).map_err(|e| FrameError::Encode(e.to_string()))?;
    let len = u32::try_from(data.len()).map_err(|_| FrameError::TooLarge(data.len()))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + data.len());
    buf.put_u32(len);
    buf.put_slice(&data);
    Ok(buf.freeze())
}

/// Decode a length from the first 4 bytes.
pub fn decode_length(buf: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*buf)
}

/// Decode a length-prefixed frame and verify its checksum.
pub fn decode_frame(buf: &[u8]) -> Result<ReplicationFrame, FrameError> {
    if buf.len() < LENGTH_PREFIX {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX,
            actual: buf.len(),
        });
    }

    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX]);
    let len = decode_length(&prefix) as usize;

    let body = &buf[LENGTH_PREFIX..];
    if body.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }

    let frame: ReplicationFrame =
        bincode::deserialize(&body[..len]).map_err(|e| FrameError::Decode(e.to_string()))?;

    if !frame.verify() {
        return Err(FrameError::ChecksumMismatch);
    }

    Ok(frame)
}
