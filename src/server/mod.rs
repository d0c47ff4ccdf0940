//! Relay server
//!
//! Network surfaces around the relay: the upstream TCP port the camera source
//! pushes into, and the HTTP endpoints viewers pull from.

pub mod config;
pub mod http;
pub mod listener;

pub use config::ServerConfig;
pub use http::{router, ViewerStream};
pub use listener::{RelayServer, UpstreamListener};
