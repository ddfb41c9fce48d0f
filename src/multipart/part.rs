//! Multipart boundary and part encoding
//!
//! Body layout of a `multipart/x-mixed-replace` response whose
//! `Content-Type` is `multipart/x-mixed-replace; boundary=<boundary>`:
//! ```text
//! --<boundary>\r\n                      ┐
//! Content-Type: <content type>\r\n      │ one part
//! Content-Length: <len>\r\n             │ per frame
//! \r\n                                  │
//! <data>\r\n                            ┘
//! --<boundary>\r\n
//! ...
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Boundary used when none is configured
pub const DEFAULT_BOUNDARY: &str = "MJPEGBOUNDARY";

/// Longest boundary allowed by RFC 2046
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Validated multipart boundary token
///
/// Restricted to the RFC 2046 `bchars` set, which is plain ASCII, so it can
/// never be mistaken for the `0xFF 0xD8` start of a JPEG payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(Arc<str>);

impl Boundary {
    /// Validate and wrap a boundary token
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        let token = token.as_ref();

        if token.is_empty() || token.len() > MAX_BOUNDARY_LEN {
            return Err(Error::InvalidBoundary(format!(
                "length must be 1..={}, got {}",
                MAX_BOUNDARY_LEN,
                token.len()
            )));
        }
        if let Some(c) = token.chars().find(|c| !is_bchar(*c)) {
            return Err(Error::InvalidBoundary(format!(
                "character {:?} not allowed",
                c
            )));
        }
        if token.ends_with(' ') {
            return Err(Error::InvalidBoundary("must not end with a space".into()));
        }

        Ok(Self(Arc::from(token)))
    }

    /// The token without the leading dashes
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_BOUNDARY))
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}

/// `Content-Type` value of the streaming response
pub fn response_content_type(boundary: &Boundary) -> String {
    format!("multipart/x-mixed-replace; boundary={}", boundary)
}

/// Headers of one part, up to and including the blank line
///
/// The payload and its trailing CRLF are written separately so frame data
/// is never copied.
pub fn encode_part_header(boundary: &Boundary, content_type: &str, len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + boundary.as_str().len() + content_type.len());

    buf.put_slice(b"--");
    buf.put_slice(boundary.as_str().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Content-Type: ");
    buf.put_slice(content_type.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", len).as_bytes());
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// Full encoding of one part, header, payload and trailer
pub fn encode_part(boundary: &Boundary, content_type: &str, data: &[u8]) -> Bytes {
    let header = encode_part_header(boundary, content_type, data.len());
    let mut buf = BytesMut::with_capacity(header.len() + data.len() + PART_TRAILER.len());

    buf.put_slice(&header);
    buf.put_slice(data);
    buf.put_slice(PART_TRAILER);

    buf.freeze()
}

/// Bytes following every part payload
pub const PART_TRAILER: &[u8] = b"\r\n";
