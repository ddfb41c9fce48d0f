//! # mjpeg-rs
//!
//! Streams a continuously refreshed image to any number of HTTP clients as
//! MJPEG (`multipart/x-mixed-replace`).
//!
//! A single producer publishes encoded frames into a one-slot
//! [`FrameBuffer`](broadcast::FrameBuffer). Every client connection holds its
//! own [`Subscription`](broadcast::Subscription) and progresses at its own
//! pace: a slow client skips to the newest frame instead of building a
//! backlog, and a failing client never affects the producer or other clients.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mjpeg_rs::broadcast::FrameBuffer;
//! use mjpeg_rs::capture::{JpegFrameEncoder, Producer, TestPattern};
//! use mjpeg_rs::server::{MjpegServer, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mjpeg_rs::error::Result<()> {
//! let buffer = Arc::new(FrameBuffer::new());
//! let shutdown = CancellationToken::new();
//!
//! let source = TestPattern::new(0, 640, 480, 30);
//! Producer::new(source, JpegFrameEncoder::default(), Arc::clone(&buffer))
//!     .spawn(shutdown.clone());
//!
//! let server = MjpegServer::new(ServerConfig::default(), buffer);
//! server.run_until(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod capture;
pub mod error;
pub mod launch;
pub mod multipart;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{Frame, FrameBuffer, Publisher, Subscription};
pub use error::{Error, Result};
pub use server::{MjpegServer, ServerConfig};
