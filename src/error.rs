//! Error types
//!
//! Errors are grouped by the area that produces them. Everything converts into
//! the top-level [`Error`] so callers can use `?` throughout.

use std::fmt;

pub use crate::multipart::DemuxError;
pub use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket bind/accept/read failure
    Io(std::io::Error),
    /// Multipart demultiplexing problem
    Demux(DemuxError),
    /// Viewer registry problem
    Registry(RegistryError),
    /// The upstream camera connection ended; ingestion for that session is over
    UpstreamDisconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Demux(e) => write!(f, "Demux error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::UpstreamDisconnected => write!(f, "Upstream disconnected"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Demux(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::UpstreamDisconnected => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<DemuxError> for Error {
    fn from(e: DemuxError) -> Self {
        Error::Demux(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
