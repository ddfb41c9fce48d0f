//! MJPEG over HTTP framing
//!
//! This module provides:
//! - Boundary validation
//! - Response content type and per-frame part encoding
//! - An encoder that turns frames into response body chunks

pub mod encoder;
pub mod part;

pub use encoder::MultipartEncoder;
pub use part::{encode_part, response_content_type, Boundary, DEFAULT_BOUNDARY};
