//! Capture collaborator traits
//!
//! A [`FrameSource`] produces raw images, a [`FrameEncoder`] turns them into
//! bytes that can be published. Both are owned by the producer loop and never
//! touched by connection tasks.

use bytes::Bytes;
use thiserror::Error;

/// A single frame failed to encode
///
/// Transient: the producer drops the frame and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("encode failed: {0}")]
pub struct EncodeError(pub String);

impl EncodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Source of raw frames, typically a capture device
///
/// Reads may block; the producer runs on a blocking thread.
pub trait FrameSource: Send + 'static {
    /// Raw frame type
    type Frame: Send;

    /// Read the next frame
    ///
    /// `None` means the device is closed and no further frames will come.
    fn read_frame(&mut self) -> Option<Self::Frame>;
}

/// Converts raw frames into encoded bytes
pub trait FrameEncoder<F>: Send + 'static {
    /// MIME type of the encoded output
    fn content_type(&self) -> &str;

    /// Encode one frame
    fn encode(&mut self, frame: &F) -> Result<Bytes, EncodeError>;
}
