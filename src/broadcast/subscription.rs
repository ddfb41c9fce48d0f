//! Per-client cursor into the frame version sequence

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::buffer::{wait_newer, Slot};
use super::error::BroadcastError;
use super::frame::Frame;

/// Result of waiting with an idle limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A newer frame is available
    Ready(Frame),
    /// The idle limit elapsed without a new frame
    TimedOut,
    /// The buffer was closed; no further frames will arrive
    Closed,
}

/// Per-client subscription
///
/// Tracks the last version handed to this client. Each wait returns the
/// newest frame after that version, skipping anything published in between,
/// so the versions a subscription observes are strictly increasing.
pub struct Subscription {
    id: u64,
    last_seen: u64,
    rx: watch::Receiver<Slot>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub(super) fn new(id: u64, rx: watch::Receiver<Slot>, active: Arc<AtomicUsize>) -> Self {
        Self {
            id,
            last_seen: 0,
            rx,
            active,
        }
    }

    /// Subscription ID, unique within its buffer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Version of the last frame returned (0 if none yet)
    pub fn last_seen_version(&self) -> u64 {
        self.last_seen
    }

    /// Wait for the next frame newer than the last one returned
    ///
    /// Cancel safe: if the future is dropped before completing, the cursor
    /// does not move.
    pub async fn next_frame(&mut self) -> Result<Frame, BroadcastError> {
        let frame = wait_newer(&mut self.rx, self.last_seen).await?;
        self.advance(&frame);
        Ok(frame)
    }

    /// Wait for the next frame, giving up after `idle` if set
    pub async fn next_within(&mut self, idle: Option<Duration>) -> WaitOutcome {
        let result = match idle {
            Some(limit) => match tokio::time::timeout(limit, self.next_frame()).await {
                Ok(result) => result,
                Err(_) => return WaitOutcome::TimedOut,
            },
            None => self.next_frame().await,
        };

        match result {
            Ok(frame) => WaitOutcome::Ready(frame),
            Err(_) => WaitOutcome::Closed,
        }
    }

    /// Take the next frame only if one is already available
    pub fn try_next(&mut self) -> Result<Option<Frame>, BroadcastError> {
        let frame = {
            let slot = self.rx.borrow_and_update();
            match slot.current {
                Some(ref frame) if frame.version > self.last_seen => Some(frame.clone()),
                _ if slot.closed => return Err(BroadcastError::Closed),
                _ => None,
            }
        };

        if let Some(ref frame) = frame {
            self.advance(frame);
        }
        Ok(frame)
    }

    fn advance(&mut self, frame: &Frame) {
        debug_assert!(frame.version > self.last_seen);
        self.last_seen = frame.version;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let prev = self.active.fetch_sub(1, Ordering::Relaxed);

        tracing::debug!(
            subscription_id = self.id,
            subscribers = prev.saturating_sub(1),
            "Subscriber removed"
        );
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}
