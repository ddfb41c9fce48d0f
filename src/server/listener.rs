//! MJPEG server listener
//!
//! Handles the TCP accept loop and serves each accepted socket as one
//! HTTP/1 connection on its own task.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use crate::broadcast::FrameBuffer;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::io::WriteTimeoutIo;
use crate::server::stream::{router, AppState, ConnectionInfo};
use crate::stats::{ServerMetrics, ServerStats};

/// First pause after a failed accept
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);

/// Longest pause between failed accepts
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Time an open connection gets to finish after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// MJPEG streaming server
pub struct MjpegServer {
    config: Arc<ServerConfig>,
    buffer: Arc<FrameBuffer>,
    metrics: Arc<ServerMetrics>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    refusal_semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl MjpegServer {
    /// Create a server streaming frames from `buffer`
    pub fn new(config: ServerConfig, buffer: Arc<FrameBuffer>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };
        let refusal_semaphore = Arc::new(Semaphore::new(config.max_pending_refusals));

        Self {
            config: Arc::new(config),
            buffer,
            metrics: Arc::new(ServerMetrics::new()),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
            refusal_semaphore,
            tracker: TaskTracker::new(),
        }
    }

    /// Get a reference to the frame buffer
    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    /// Live server counters
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current server counters
    pub fn stats(&self) -> ServerStats {
        self.metrics.snapshot()
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "MJPEG server listening");
        Ok(listener)
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    ///
    /// Returns after `shutdown` is cancelled and every connection task has
    /// finished.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = router(AppState {
            config: Arc::clone(&self.config),
            buffer: Arc::clone(&self.buffer),
            metrics: Arc::clone(&self.metrics),
            shutdown: shutdown.clone(),
        });

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener, &app, &shutdown) => {}
        }

        drop(listener);
        self.tracker.close();
        tracing::debug!(connections = self.tracker.len(), "Waiting for connections to close");
        self.tracker.wait().await;

        tracing::info!(stats = ?self.metrics.snapshot(), "MJPEG server stopped");
        Ok(())
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        app: &Router,
        shutdown: &CancellationToken,
    ) {
        let mut backoff = AcceptBackoff::new();

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    backoff.reset();
                    self.handle_connection(socket, peer_addr, app, shutdown);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        retry_ms = delay.as_millis() as u64,
                        "Failed to accept connection"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        app: &Router,
        shutdown: &CancellationToken,
    ) {
        self.metrics.connection_accepted();

        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.metrics.connection_rejected();
                    self.refuse(socket, shutdown);
                    return;
                }
            }
        } else {
            None
        };

        // Generate connection ID
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        // Configure socket
        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let io = WriteTimeoutIo::new(socket, self.config.write_timeout);
        let info = ConnectionInfo {
            id: connection_id,
            peer_addr: Some(peer_addr),
            write_timed_out: io.timed_out(),
        };
        let app = app.clone();
        let service = service_fn(move |mut req: Request<Incoming>| {
            req.extensions_mut().insert(info.clone());
            app.clone().oneshot(req)
        });

        let conn = http1::Builder::new()
            .half_close(true)
            .keep_alive(false)
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.request_timeout)
            .serve_connection(TokioIo::new(io), service);
        let shutdown = shutdown.clone();

        self.tracker.spawn(async move {
            let _permit: Option<OwnedSemaphorePermit> = permit;
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    match tokio::time::timeout(SHUTDOWN_GRACE, conn.as_mut()).await {
                        Ok(result) => result,
                        Err(_) => Ok(()),
                    }
                }
            };

            match result {
                Ok(()) => {
                    tracing::debug!(connection_id = connection_id, "Connection closed");
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = connection_id,
                        error = %e,
                        "Connection error"
                    );
                }
            }
        });
    }

    /// Answer 503 to a connection over the limit
    ///
    /// At most `max_pending_refusals` answers are in flight; past that the
    /// socket is closed at once.
    fn refuse(&self, socket: TcpStream, shutdown: &CancellationToken) {
        let Ok(permit) = Arc::clone(&self.refusal_semaphore).try_acquire_owned() else {
            tracing::debug!("Refusal backlog full, dropping connection");
            return;
        };

        let io = WriteTimeoutIo::new(socket, self.config.write_timeout);
        let conn = http1::Builder::new()
            .keep_alive(false)
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.request_timeout)
            .serve_connection(
                TokioIo::new(io),
                service_fn(|_req: Request<Incoming>| async {
                    Ok::<_, Infallible>(service_unavailable())
                }),
            );
        let shutdown = shutdown.clone();

        self.tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = conn => {}
                _ = shutdown.cancelled() => {}
            }
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONNECTION, "close")],
        "Service Unavailable",
    )
        .into_response()
}

/// Exponential pause between failed accepts, reset by a successful one
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            next: ACCEPT_BACKOFF_MIN,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff_doubles_to_cap() {
        let mut backoff = AcceptBackoff::new();

        let delays: Vec<u64> = (0..10)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();

        assert_eq!(delays, [5, 10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn test_accept_backoff_reset() {
        let mut backoff = AcceptBackoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MIN);
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_refusals_are_bounded() {
        let config = ServerConfig::default()
            .max_connections(1)
            .max_pending_refusals(1);
        let server = MjpegServer::new(config, Arc::new(FrameBuffer::new()));
        let shutdown = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Two idle clients over the limit; only one refusal task may wait on them
        let _a = TcpStream::connect(addr).await.unwrap();
        let (socket_a, _) = listener.accept().await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        let (socket_b, _) = listener.accept().await.unwrap();

        server.refuse(socket_a, &shutdown);
        assert_eq!(server.refusal_semaphore.available_permits(), 0);
        assert_eq!(server.tracker.len(), 1);

        server.refuse(socket_b, &shutdown);
        assert_eq!(server.tracker.len(), 1);

        shutdown.cancel();
        server.tracker.close();
        server.tracker.wait().await;
        assert_eq!(server.refusal_semaphore.available_permits(), 1);
    }
}
