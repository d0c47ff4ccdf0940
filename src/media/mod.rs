//! JPEG frame handling
//!
//! This module provides:
//! - Locating the JPEG start-of-image marker inside a multipart segment
//! - The single-slot cache holding the most recent complete frame

pub mod cache;
pub mod jpeg;

pub use cache::{FrameCache, FrameReader};
pub use jpeg::{find_soi, Frame, SOI_MARKER};
