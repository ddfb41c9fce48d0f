//! Single-slot frame buffer and publisher
//!
//! The buffer holds only the most recently published frame. Publishing
//! replaces the slot and wakes every waiter at once; nothing is queued, so a
//! slow reader simply observes the newest frame the next time it looks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

use super::error::BroadcastError;
use super::frame::{Frame, CONTENT_TYPE_JPEG};
use super::subscription::Subscription;

/// Contents of the watch channel
#[derive(Debug, Default)]
pub(super) struct Slot {
    /// Latest published frame (None before the first publish)
    pub(super) current: Option<Frame>,
    /// Set once the source has ended
    pub(super) closed: bool,
}

impl Slot {
    pub(super) fn version(&self) -> u64 {
        self.current.as_ref().map_or(0, |frame| frame.version)
    }
}

/// Latest-value store with broadcast wake-up
///
/// The slot and its version live inside a `tokio::sync::watch` channel, which
/// is the only shared mutable state in the crate. Publishing never awaits and
/// costs the same whether there are zero or thousands of subscribers.
#[derive(Debug)]
pub struct FrameBuffer {
    tx: watch::Sender<Slot>,
    subscriber_count: Arc<AtomicUsize>,
    next_subscription_id: AtomicU64,
}

impl FrameBuffer {
    /// Create an empty frame buffer
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Slot::default());

        Self {
            tx,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Replace the current frame and wake all waiters
    ///
    /// Returns the version assigned to the frame.
    pub fn publish(&self, data: Bytes, content_type: Arc<str>) -> Result<u64, BroadcastError> {
        if data.is_empty() {
            return Err(BroadcastError::EmptyFrame);
        }

        let mut outcome = Err(BroadcastError::Closed);
        self.tx.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            let version = slot.version() + 1;
            slot.current = Some(Frame::new(data, content_type, version));
            outcome = Ok(version);
            true
        });

        if let Ok(version) = outcome {
            tracing::trace!(version = version, "Frame published");
        }
        outcome
    }

    /// Current frame, without blocking
    pub fn snapshot(&self) -> Result<Frame, BroadcastError> {
        self.tx
            .borrow()
            .current
            .clone()
            .ok_or(BroadcastError::NoFrameYet)
    }

    /// Wait until a frame with a version strictly greater than `after` exists
    ///
    /// Resolves immediately if one already does. Returns `Closed` once the
    /// buffer is closed and nothing newer than `after` remains.
    pub async fn wait_for_newer(&self, after: u64) -> Result<Frame, BroadcastError> {
        let mut rx = self.tx.subscribe();
        wait_newer(&mut rx, after).await
    }

    /// Create a subscription positioned before every published frame
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let active = self.subscriber_count.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::debug!(subscription_id = id, subscribers = active, "Subscriber added");

        Subscription::new(id, self.tx.subscribe(), Arc::clone(&self.subscriber_count))
    }

    /// Mark the source as ended and wake every waiter
    ///
    /// Returns false if the buffer was already closed.
    pub fn close(&self) -> bool {
        let closed = self.tx.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            slot.closed = true;
            true
        });

        if closed {
            tracing::info!(
                version = self.version(),
                subscribers = self.subscriber_count(),
                "Frame buffer closed"
            );
        }
        closed
    }

    /// Whether the buffer has been closed
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Version of the current frame (0 before the first publish)
    pub fn version(&self) -> u64 {
        self.tx.borrow().version()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub(super) async fn wait_newer(
    rx: &mut watch::Receiver<Slot>,
    after: u64,
) -> Result<Frame, BroadcastError> {
    let slot = rx
        .wait_for(|slot| slot.closed || slot.version() > after)
        .await
        .map_err(|_| BroadcastError::Closed)?;

    // A newer frame still wins over the closed flag so the last image is
    // delivered before the stream ends.
    match slot.current {
        Some(ref frame) if frame.version > after => Ok(frame.clone()),
        _ => Err(BroadcastError::Closed),
    }
}

/// Publishing handle for the capture loop
///
/// Binds a content type to a shared buffer so the producer only hands over
/// encoded bytes.
#[derive(Debug, Clone)]
pub struct Publisher {
    buffer: Arc<FrameBuffer>,
    content_type: Arc<str>,
}

impl Publisher {
    /// Create a publisher for the given content type
    pub fn new(buffer: Arc<FrameBuffer>, content_type: impl Into<Arc<str>>) -> Self {
        Self {
            buffer,
            content_type: content_type.into(),
        }
    }

    /// Create a publisher for JPEG frames
    pub fn jpeg(buffer: Arc<FrameBuffer>) -> Self {
        Self::new(buffer, CONTENT_TYPE_JPEG)
    }

    /// Publish an encoded frame
    pub fn publish(&self, data: impl Into<Bytes>) -> Result<u64, BroadcastError> {
        self.buffer
            .publish(data.into(), Arc::clone(&self.content_type))
    }

    /// Close the underlying buffer
    pub fn close(&self) -> bool {
        self.buffer.close()
    }

    /// Content type attached to every published frame
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The shared buffer
    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }
}
