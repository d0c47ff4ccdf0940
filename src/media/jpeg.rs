//! JPEG frame extraction
//!
//! The camera helper emits each image as a multipart part with a few header
//! lines in front of the JPEG payload. The payload itself is located by
//! scanning for the start-of-image marker:
//!
//! ```text
//! Content-Type: image/jpeg\r\n
//! Content-Length: 12345\r\n
//! \r\n
//! FF D8 FF E0 ... (JPEG data)
//! ```
//!
//! Nothing past the marker is inspected; the payload is treated as opaque.

use bytes::Bytes;

/// JPEG start-of-image marker (SOI followed by the first segment marker byte)
pub const SOI_MARKER: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Find the offset of the first start-of-image marker in `data`
pub fn find_soi(data: &[u8]) -> Option<usize> {
    data.windows(SOI_MARKER.len())
        .position(|window| window == SOI_MARKER)
}

/// A complete JPEG image as received from upstream
///
/// Cheap to clone due to `Bytes` reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Image bytes, starting at the start-of-image marker
    pub data: Bytes,
    /// Position of this frame in the upstream sequence (1-based)
    pub sequence: u64,
}

impl Frame {
    /// Extract a frame from one multipart part
    ///
    /// Returns `None` when the part carries no start-of-image marker.
    pub fn from_part(part: Bytes, sequence: u64) -> Option<Self> {
        let start = find_soi(&part)?;
        Some(Self {
            data: part.slice(start..),
            sequence,
        })
    }

    /// Size of the image in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
