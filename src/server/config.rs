//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::multipart::Boundary;

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Path that serves the stream (None = every path)
    pub stream_path: Option<String>,

    /// Multipart boundary token
    pub boundary: Boundary,

    /// The request headers must arrive within this time
    pub request_timeout: Duration,

    /// A stalled socket write fails after this long
    pub write_timeout: Duration,

    /// Send an empty part after this long without a new frame (None = never)
    pub keepalive_interval: Option<Duration>,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Connections over the limit that may wait for their 503 at once
    pub max_pending_refusals: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
            max_connections: 0, // Unlimited
            stream_path: None,
            boundary: Boundary::default(),
            request_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(60),
            keepalive_interval: None,
            tcp_nodelay: true, // Frames should leave as soon as they are written
            max_pending_refusals: 32,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Serve the stream only on this path
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.stream_path = Some(if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        });
        self
    }

    /// Set the multipart boundary
    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set request head timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set per-write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Send keep-alive parts when idle for `interval`
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Set how many over-limit connections may wait for a 503 at once
    pub fn max_pending_refusals(mut self, max: usize) -> Self {
        self.max_pending_refusals = max;
        self
    }
}
