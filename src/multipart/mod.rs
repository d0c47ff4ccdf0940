//! Multipart stream handling
//!
//! The camera helper writes an endless `multipart/x-mixed-replace` body: JPEG
//! parts separated by a boundary line. This module splits that byte stream
//! back into segments without assuming anything about how the transport
//! chunked it.
//!
//! ```text
//!  upstream chunks ──► Demuxer::push() ──► Segment { data, frame }
//!                        │                        │          │
//!                   BytesMut pending         fan-out     FrameCache
//! ```

pub mod boundary;
pub mod demux;
pub mod error;

pub use boundary::{Boundary, DEFAULT_BOUNDARY};
pub use demux::{DemuxStats, Demuxer, Segment};
pub use error::DemuxError;
