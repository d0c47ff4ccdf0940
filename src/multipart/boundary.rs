//! Multipart boundary token

use bytes::Bytes;

/// Boundary name used by the camera helper pipeline
pub const DEFAULT_BOUNDARY: &str = "spionisto";

/// A multipart boundary
///
/// On the wire each part is terminated by `--{name}\r\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    name: String,
    token: Bytes,
}

impl Boundary {
    /// Create a boundary from its name (without the leading dashes)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let token = Bytes::from(format!("--{}\r\n", name));
        Self { name, token }
    }

    /// Boundary name as advertised in the content type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delimiter bytes as they appear in the stream
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// `Content-Type` header value for viewers of this stream
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.name)
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY)
    }
}
