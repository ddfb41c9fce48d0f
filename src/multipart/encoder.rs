//! Multipart body framing
//!
//! Turns frames into the chunks of one response body. One encoder per
//! response; the payload of each frame is passed through without copying.

use bytes::Bytes;

use crate::broadcast::Frame;

use super::part::{encode_part_header, response_content_type, Boundary, PART_TRAILER};

/// Frames the parts of a `multipart/x-mixed-replace` body
#[derive(Debug)]
pub struct MultipartEncoder {
    boundary: Boundary,
    parts_written: u64,
    bytes_written: u64,
}

impl MultipartEncoder {
    /// Create an encoder for `boundary`
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            parts_written: 0,
            bytes_written: 0,
        }
    }

    /// `Content-Type` header value for the response
    pub fn content_type(&self) -> String {
        response_content_type(&self.boundary)
    }

    /// Chunks for one frame: part header, payload, trailer
    pub fn encode_frame(&mut self, frame: &Frame) -> [Bytes; 3] {
        let header = encode_part_header(&self.boundary, &frame.content_type, frame.data.len());
        self.account(header.len() + frame.data.len() + PART_TRAILER.len());

        [
            header,
            frame.data.clone(),
            Bytes::from_static(PART_TRAILER),
        ]
    }

    /// A zero-length part, so idle proxies and clients see traffic
    pub fn encode_keepalive(&mut self, content_type: &str) -> Bytes {
        let header = encode_part_header(&self.boundary, content_type, 0);
        let mut part = Vec::with_capacity(header.len() + PART_TRAILER.len());
        part.extend_from_slice(&header);
        part.extend_from_slice(PART_TRAILER);

        self.account(part.len());
        Bytes::from(part)
    }

    fn account(&mut self, len: usize) {
        self.parts_written += 1;
        self.bytes_written += len as u64;
    }

    /// Boundary used by this encoder
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Number of parts produced, keep-alives included
    pub fn parts_written(&self) -> u64 {
        self.parts_written
    }

    /// Number of body bytes produced
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::part::encode_part;
    use super::*;
    use crate::broadcast::{FrameBuffer, CONTENT_TYPE_JPEG};

    fn frame(data: &'static [u8]) -> Frame {
        let buffer = FrameBuffer::new();
        buffer
            .publish(Bytes::from_static(data), Arc::from(CONTENT_TYPE_JPEG))
            .unwrap();
        buffer.snapshot().unwrap()
    }

    #[test]
    fn test_frame_chunks_concatenate_to_part() {
        let boundary = Boundary::default();
        let mut encoder = MultipartEncoder::new(boundary.clone());

        let mut body = Vec::new();
        for chunk in encoder.encode_frame(&frame(b"first")) {
            body.extend_from_slice(&chunk);
        }
        for chunk in encoder.encode_frame(&frame(b"second")) {
            body.extend_from_slice(&chunk);
        }

        let mut expected = encode_part(&boundary, "image/jpeg", b"first").to_vec();
        expected.extend_from_slice(&encode_part(&boundary, "image/jpeg", b"second"));

        assert_eq!(body, expected);
        assert_eq!(encoder.parts_written(), 2);
        assert_eq!(encoder.bytes_written(), expected.len() as u64);
    }

    #[test]
    fn test_payload_not_copied() {
        let mut encoder = MultipartEncoder::new(Boundary::default());
        let frame = frame(b"payload");

        let [_, payload, _] = encoder.encode_frame(&frame);

        assert_eq!(payload.as_ptr(), frame.data.as_ptr());
    }

    #[test]
    fn test_keepalive_is_empty_part() {
        let mut encoder = MultipartEncoder::new(Boundary::new("b").unwrap());

        let part = encoder.encode_keepalive("image/jpeg");

        assert_eq!(
            &part[..],
            b"--b\r\nContent-Type: image/jpeg\r\nContent-Length: 0\r\n\r\n\r\n"
        );
        assert_eq!(encoder.parts_written(), 1);
    }

    #[test]
    fn test_content_type() {
        let encoder = MultipartEncoder::new(Boundary::default());

        assert_eq!(
            encoder.content_type(),
            "multipart/x-mixed-replace; boundary=MJPEGBOUNDARY"
        );
        assert_eq!(encoder.boundary().as_str(), "MJPEGBOUNDARY");
    }
}
