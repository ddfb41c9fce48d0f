//! Statistics for streaming sessions and the server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::session::CloseReason;

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Frames written to the client
    pub frames_sent: u64,
    /// Zero-length keep-alive parts written
    pub keepalives_sent: u64,
    /// Total body bytes produced, keep-alive parts included
    pub bytes_sent: u64,
    /// Published versions the client never received
    pub frames_skipped: u64,
    /// Time spent streaming
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Average delivered frame rate
    pub fn frame_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Average output bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let millis = self.duration.as_millis() as u64;
        if millis > 0 {
            self.bytes_sent * 8 * 1000 / millis
        } else {
            0
        }
    }
}

/// Point-in-time copy of the server counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections accepted
    pub total_connections: u64,
    /// Requests refused (connection limit reached or source ended)
    pub rejected_connections: u64,
    /// Streams currently open
    pub active_streams: u64,
    /// Streams ended by a failed or timed-out write
    pub failed_streams: u64,
    /// Frames written across all streams
    pub frames_sent: u64,
    /// Bytes written across all streams
    pub bytes_sent: u64,
    /// Uptime
    pub uptime: Duration,
}

/// Server-wide counters, updated concurrently by connection tasks
#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    active_streams: AtomicU64,
    failed_streams: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            failed_streams: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub(crate) fn connection_accepted(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_closed(&self, session: &SessionStats, reason: CloseReason) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
        if reason == CloseReason::Error {
            self.failed_streams.fetch_add(1, Ordering::Relaxed);
        }
        self.frames_sent
            .fetch_add(session.frames_sent, Ordering::Relaxed);
        self.bytes_sent.fetch_add(session.bytes_sent, Ordering::Relaxed);
    }

    /// Number of streams currently open
    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Copy all counters
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            failed_streams: self.failed_streams.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
