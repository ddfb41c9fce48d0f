//! Stream session state machine
//!
//! Tracks one HTTP client from request to disconnection.

use std::net::SocketAddr;
use std::time::Instant;

use crate::broadcast::Frame;
use crate::stats::SessionStats;

/// Why a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side of the connection
    Client,
    /// A write failed or timed out
    Error,
    /// The server is shutting down
    ServerShutdown,
    /// The frame source ended and no new frames will arrive
    SourceEnded,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::Client => "closed-by-client",
            CloseReason::Error => "closed-by-error",
            CloseReason::ServerShutdown => "closed-by-server-shutdown",
            CloseReason::SourceEnded => "closed-by-source-end",
        };
        f.write_str(s)
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Response headers sent, waiting for the first frame
    Waiting,
    /// At least one frame delivered
    Streaming,
    /// Terminal
    Closed(CloseReason),
}

/// State of one streaming response
#[derive(Debug)]
pub struct StreamSession {
    /// Connection ID
    pub id: u64,

    /// Remote peer address, if known
    pub peer_addr: Option<SocketAddr>,

    /// Current phase
    pub phase: SessionPhase,

    /// When streaming started
    pub started_at: Instant,

    /// Last version delivered
    pub last_version: u64,

    stats: SessionStats,
}

impl StreamSession {
    /// Create a session in the waiting phase
    pub fn new(id: u64, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Waiting,
            started_at: Instant::now(),
            last_version: 0,
            stats: SessionStats::new(),
        }
    }

    /// Record a delivered frame
    pub fn on_frame(&mut self, frame: &Frame) {
        if self.is_closed() {
            return;
        }
        if self.last_version > 0 {
            self.stats.frames_skipped += frame.version.saturating_sub(self.last_version + 1);
        }
        self.last_version = frame.version;
        self.stats.frames_sent += 1;
        self.phase = SessionPhase::Streaming;
    }

    /// Record a keep-alive part
    pub fn on_keepalive(&mut self) {
        self.stats.keepalives_sent += 1;
    }

    /// Enter the terminal phase; later calls keep the first reason
    pub fn close(&mut self, reason: CloseReason, bytes_sent: u64) {
        if self.is_closed() {
            return;
        }
        self.phase = SessionPhase::Closed(reason);
        self.stats.bytes_sent = bytes_sent;
        self.stats.duration = self.started_at.elapsed();
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        matches!(self.phase, SessionPhase::Closed(_))
    }

    /// Terminal reason, if closed
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.phase {
            SessionPhase::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Session statistics
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}
