//! Viewer registry and fan-out
//!
//! The registry owns one push producer per connected viewer and writes each
//! ready segment to every producer that is currently Active.
//!
//! # Architecture
//!
//! ```text
//!                     relay task (single owner)
//!                 ┌──────────────────────────────┐
//!                 │ ClientRegistry {             │
//!                 │   clients: Vec<Producer>,    │
//!                 │ }                            │
//!                 └──────────────┬───────────────┘
//!                                │ fan_out(segment)
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!    [Active]               [Paused]               [Active]
//!    try_write()            skipped                try_write()
//!         │                                             │
//!         └──► ChannelSink ──► ViewerFeed ──► HTTP body ◄┘
//! ```
//!
//! Writes never wait. A full viewer queue pauses that viewer and the segment
//! is simply not delivered to it; there is no per-viewer backlog.
//!
//! `bytes::Bytes` is reference counted, so every viewer shares the same
//! segment allocation.

pub mod config;
pub mod error;
pub mod producer;
pub mod sink;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use producer::{ClientId, ClientProducer, ProducerState, ResumeExpired};
pub use sink::{viewer_channel, ChannelSink, SegmentSink, ViewerFeed, WriteOutcome};
pub use store::{ClientRegistry, ClientStats, FanOutReport};
