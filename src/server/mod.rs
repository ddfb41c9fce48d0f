//! HTTP streaming server
//!
//! Accepts TCP connections and serves each one with hyper. Stream requests
//! are routed through axum to a `multipart/x-mixed-replace` response fed by
//! the shared frame buffer.

pub mod config;
pub mod io;
pub mod listener;
mod stream;

pub use config::ServerConfig;
pub use io::WriteTimeoutIo;
pub use listener::MjpegServer;
