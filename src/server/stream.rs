//! Stream route
//!
//! Builds the axum router. A stream request subscribes to the frame buffer
//! and answers with a `multipart/x-mixed-replace` body that yields one part
//! per new frame until the source ends or the server shuts down. The body is
//! dropped when the client goes away, and dropping it releases the
//! subscription and records the session.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{FrameBuffer, Subscription, WaitOutcome, CONTENT_TYPE_JPEG};
use crate::multipart::MultipartEncoder;
use crate::server::config::ServerConfig;
use crate::session::{CloseReason, StreamSession};
use crate::stats::ServerMetrics;

/// Shared handles for request handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) buffer: Arc<FrameBuffer>,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) shutdown: CancellationToken,
}

/// Per-connection data attached to each request by the listener
#[derive(Debug, Clone)]
pub(crate) struct ConnectionInfo {
    pub(crate) id: u64,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) write_timed_out: Arc<AtomicBool>,
}

impl ConnectionInfo {
    fn detached() -> Self {
        Self {
            id: 0,
            peer_addr: None,
            write_timed_out: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Router serving the stream on the configured path, or on every path
pub(crate) fn router(state: AppState) -> Router {
    let router = match state.config.stream_path.as_deref() {
        Some(path) => Router::new()
            .route(path, get(stream_handler))
            .fallback(not_found),
        None => Router::new()
            .route("/", get(stream_handler))
            .route("/{*path}", get(stream_handler)),
    };

    router.with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn stream_handler(State(state): State<AppState>, req: Request) -> Response {
    let info = req
        .extensions()
        .get::<ConnectionInfo>()
        .cloned()
        .unwrap_or_else(ConnectionInfo::detached);

    if state.buffer.is_closed() {
        state.metrics.connection_rejected();
        tracing::debug!(connection_id = info.id, "Source ended, refusing stream");
        return (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response();
    }

    let subscription = state.buffer.subscribe();
    let encoder = MultipartEncoder::new(state.config.boundary.clone());
    let content_type = encoder.content_type();

    state.metrics.stream_opened();
    tracing::debug!(
        connection_id = info.id,
        subscription_id = subscription.id(),
        path = req.uri().path(),
        user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-"),
        "Stream opened"
    );

    let guard = StreamGuard {
        session: StreamSession::new(info.id, info.peer_addr),
        subscription,
        encoder,
        content_type: Arc::from(CONTENT_TYPE_JPEG),
        reason: None,
        write_timed_out: info.write_timed_out,
        metrics: Arc::clone(&state.metrics),
    };
    let body = frame_body(guard, state.shutdown.clone(), state.config.keepalive_interval);

    (
        [(header::CONTENT_TYPE, content_type)],
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
        .into_response()
}

/// Body chunks: one part per frame, a keep-alive part when idle
fn frame_body(
    mut guard: StreamGuard,
    shutdown: CancellationToken,
    keepalive: Option<Duration>,
) -> Body {
    Body::from_stream(async_stream::stream! {
        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => None,
                outcome = guard.subscription.next_within(keepalive) => Some(outcome),
            };

            match outcome {
                Some(WaitOutcome::Ready(frame)) => {
                    guard.session.on_frame(&frame);
                    guard.content_type = Arc::clone(&frame.content_type);
                    for chunk in guard.encoder.encode_frame(&frame) {
                        yield Ok::<_, Infallible>(chunk);
                    }
                }
                Some(WaitOutcome::TimedOut) => {
                    guard.session.on_keepalive();
                    let part = guard.encoder.encode_keepalive(&guard.content_type);
                    yield Ok::<_, Infallible>(part);
                }
                Some(WaitOutcome::Closed) => {
                    guard.reason = Some(CloseReason::SourceEnded);
                    break;
                }
                None => {
                    guard.reason = Some(CloseReason::ServerShutdown);
                    break;
                }
            }
        }
    })
}

/// State of one open stream, finalized when the body is dropped
struct StreamGuard {
    session: StreamSession,
    subscription: Subscription,
    encoder: MultipartEncoder,
    content_type: Arc<str>,
    /// Set when the stream ends on its own
    reason: Option<CloseReason>,
    write_timed_out: Arc<AtomicBool>,
    metrics: Arc<ServerMetrics>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Without an explicit reason hyper dropped the body: the socket
        // failed or the client went away
        let reason = self.reason.unwrap_or_else(|| {
            if self.write_timed_out.load(Ordering::Relaxed) {
                CloseReason::Error
            } else {
                CloseReason::Client
            }
        });

        self.session.close(reason, self.encoder.bytes_written());
        let stats = self.session.stats();
        self.metrics.stream_closed(stats, reason);

        tracing::debug!(
            connection_id = self.session.id,
            subscription_id = self.subscription.id(),
            reason = %reason,
            frames = stats.frames_sent,
            skipped = stats.frames_skipped,
            keepalives = stats.keepalives_sent,
            bytes = stats.bytes_sent,
            duration_ms = stats.duration.as_millis() as u64,
            "Stream closed"
        );
    }
}
