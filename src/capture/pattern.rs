//! Synthetic frame source and JPEG encoder
//!
//! Used by the `mjpeg-server` binary when no capture backend is linked in:
//! the device index seeds a moving colour pattern paced at a fixed rate.

use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::broadcast::CONTENT_TYPE_JPEG;

use super::source::{EncodeError, FrameEncoder, FrameSource};

/// Packed 8-bit RGB image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    /// Whether the pixel buffer matches the dimensions
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * 3
    }
}

/// Moving gradient with a sweeping bar
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    seed: u8,
    interval: Duration,
    frame_limit: Option<u64>,
    frames: u64,
    next_due: Option<Instant>,
}

impl TestPattern {
    /// Create a pattern for the given device index and frame rate
    pub fn new(device: u32, width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            seed: (device % 256) as u8,
            interval: Duration::from_secs(1) / fps.max(1),
            frame_limit: None,
            frames: 0,
            next_due: None,
        }
    }

    /// Report the device closed after `limit` frames
    pub fn frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn pace(&mut self) {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Skip missed deadlines instead of bursting to catch up
        self.next_due = Some(due.max(now) + self.interval);
    }

    fn render(&self) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let t = self.frames as u32;
        let bar = t.wrapping_mul(4) % w;
        let mut pixels = Vec::with_capacity(w as usize * h as usize * 3);

        for y in 0..h {
            for x in 0..w {
                if x.abs_diff(bar) < 4 {
                    pixels.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
                    continue;
                }
                let r = (x.wrapping_add(t) % w * 255 / w) as u8;
                let g = (y.wrapping_add(t.wrapping_mul(2)) % h * 255 / h) as u8;
                let b = self.seed.wrapping_mul(61) ^ ((x ^ y) as u8);
                pixels.extend_from_slice(&[r, g, b]);
            }
        }

        RgbImage {
            width: w,
            height: h,
            pixels,
        }
    }
}

impl FrameSource for TestPattern {
    type Frame = RgbImage;

    fn read_frame(&mut self) -> Option<RgbImage> {
        if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
            return None;
        }
        self.pace();
        let image = self.render();
        self.frames += 1;
        Some(image)
    }
}

/// Baseline JPEG encoder
#[derive(Debug, Clone)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// Create an encoder; quality is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(80)
    }
}

impl FrameEncoder<RgbImage> for JpegFrameEncoder {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_JPEG
    }

    fn encode(&mut self, frame: &RgbImage) -> Result<Bytes, EncodeError> {
        if !frame.is_well_formed() {
            return Err(EncodeError::new(format!(
                "{} bytes for a {}x{} RGB image",
                frame.pixels.len(),
                frame.width,
                frame.height
            )));
        }

        let mut out = Vec::with_capacity(frame.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&frame.pixels, frame.width, frame.height, ColorType::Rgb8)
            .map_err(|e| EncodeError::new(e.to_string()))?;

        Ok(Bytes::from(out))
    }
}
