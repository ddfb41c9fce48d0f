//! Per-connection stream session tracking

pub mod state;

pub use state::{CloseReason, SessionPhase, StreamSession};
