//! Broadcast error types

use thiserror::Error;

/// Error type for frame buffer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// Nothing has been published yet
    #[error("no frame published yet")]
    NoFrameYet,
    /// Publish was called with an empty payload
    #[error("refusing to publish an empty frame")]
    EmptyFrame,
    /// The frame source has ended; no newer frame will ever arrive
    #[error("frame buffer closed")]
    Closed,
}
