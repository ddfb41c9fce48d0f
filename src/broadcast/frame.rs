//! Published frame type
//!
//! A frame is one encoded image tagged with the version it was published
//! under. Frames are immutable once published and cheap to clone: the payload
//! is a reference-counted `Bytes` and the content type an `Arc<str>`, so every
//! subscriber shares the same allocation.

use std::sync::Arc;

use bytes::Bytes;

/// Content type used for JPEG frames
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

/// One encoded image ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image bytes (zero-copy via reference counting)
    pub data: Bytes,
    /// MIME type of `data` (e.g., "image/jpeg")
    pub content_type: Arc<str>,
    /// Publish version, strictly increasing, starting at 1
    pub version: u64,
}

impl Frame {
    pub(crate) fn new(data: Bytes, content_type: Arc<str>, version: u64) -> Self {
        Self {
            data,
            content_type,
            version,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty (never true for a published frame)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_payload() {
        let frame = Frame::new(Bytes::from_static(b"jpeg"), Arc::from(CONTENT_TYPE_JPEG), 7);
        let copy = frame.clone();

        assert_eq!(copy, frame);
        assert_eq!(copy.data.as_ptr(), frame.data.as_ptr());
        assert_eq!(copy.len(), 4);
        assert!(!copy.is_empty());
    }
}
