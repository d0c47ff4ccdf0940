//! Demultiplexer error types

/// Error type for demultiplexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// A completed part contained no JPEG start-of-image marker
    MalformedFrame {
        /// Length of the offending part
        len: usize,
    },
    /// No boundary arrived before the pending buffer exceeded its cap;
    /// the pending bytes were discarded
    BufferOverflow {
        /// Bytes that were pending when the cap was hit
        pending: usize,
        /// Configured cap
        limit: usize,
    },
}

impl std::fmt::Display for DemuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemuxError::MalformedFrame { len } => {
                write!(f, "Part of {} bytes has no JPEG start marker", len)
            }
            DemuxError::BufferOverflow { pending, limit } => write!(
                f,
                "No boundary within {} pending bytes (limit {}), discarded",
                pending, limit
            ),
        }
    }
}

impl std::error::Error for DemuxError {}
