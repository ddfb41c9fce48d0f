//! Error types for mjpeg-rs

use thiserror::Error;

use crate::broadcast::BroadcastError;

/// Main error type for server operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on a socket or listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame buffer error
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// Invalid multipart boundary
    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;
