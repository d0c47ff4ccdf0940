//! The relay service
//!
//! Ties the demultiplexer, frame cache and viewer registry together behind a
//! single task. See [`service`] for the task layout and [`core`] for the
//! state it owns.

pub mod command;
pub mod config;
pub mod core;
pub mod service;

pub use command::{ClientSignal, UpstreamEvent};
pub use config::RelayConfig;
pub use self::core::RelayCore;
pub use service::{ClientHandle, Relay, RelayHandle, UpstreamSession};
