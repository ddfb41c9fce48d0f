//! Latest-frame broadcast
//!
//! The capture loop publishes encoded frames into a single-slot
//! [`FrameBuffer`]; every HTTP client holds a [`Subscription`] that waits for
//! a version newer than the last one it sent.
//!
//! # Architecture
//!
//! ```text
//!   [Producer] ──► Publisher::publish() ──► FrameBuffer (watch slot)
//!                                               │
//!            ┌──────────────────────────────────┼───────────────────────┐
//!            ▼                                  ▼                       ▼
//!      [Subscription]                    [Subscription]          [Subscription]
//!      next_frame()                      next_frame()            next_frame()
//!            │                                  │                       │
//!            └──► MultipartEncoder ──► axum     └──► ...                └──► ...
//! ```
//!
//! # Drop, don't queue
//!
//! There is exactly one slot. A subscriber that falls behind skips straight
//! to the newest frame; memory use does not grow with publish rate or with
//! subscriber lag. Payloads are `bytes::Bytes`, so all subscribers share one
//! allocation per frame.

pub mod buffer;
pub mod error;
pub mod frame;
pub mod subscription;

pub use buffer::{FrameBuffer, Publisher};
pub use error::BroadcastError;
pub use frame::{Frame, CONTENT_TYPE_JPEG};
pub use subscription::{Subscription, WaitOutcome};
