//! Serialization for relay frames.
//!
//! Frames are postcard-encoded. WebSocket preserves message boundaries, so
//! no length prefix is added; instead the decoder enforces
//! [`MAX_FRAME_SIZE`] before touching the payload.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest frame the codec will decode (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

/// Encodes a frame into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized, or
/// `CodecError::TooLarge` if the result would not be accepted by [`decode`].
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, CodecError> {
    let bytes =
        postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(bytes)
}

/// Decodes a frame from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::TooLarge` for oversized input and
/// `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
