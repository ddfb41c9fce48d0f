//! Frame acquisition and encoding
//!
//! This module provides:
//! - The [`FrameSource`] and [`FrameEncoder`] collaborator traits
//! - The [`Producer`] loop that feeds the frame buffer
//! - A synthetic test pattern source and a JPEG encoder

pub mod pattern;
pub mod producer;
pub mod source;

pub use pattern::{JpegFrameEncoder, RgbImage, TestPattern};
pub use producer::{Producer, ProducerConfig, ProducerExit, ProducerReport};
pub use source::{EncodeError, FrameEncoder, FrameSource};
