//! # mjpeg-relay
//!
//! Relays a single MJPEG camera feed to any number of HTTP viewers.
//!
//! The camera source pushes an endless `multipart/x-mixed-replace` byte stream
//! over TCP. The relay splits it on the multipart boundary, keeps the newest
//! JPEG for `/latest.jpeg`, and re-streams the raw parts to every viewer of
//! `/stream.mjpeg`. Each viewer has its own flow control: a slow viewer is
//! paused and misses parts rather than slowing down ingestion or the other
//! viewers.
//!
//! ```text
//!  camera ──TCP──► UpstreamListener ──► Relay task ──► ClientRegistry ──► viewers
//!                                        │
//!                                        └──► FrameCache ──► /latest.jpeg
//! ```
//!
//! # Example
//! ```no_run
//! use mjpeg_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> mjpeg_relay::error::Result<()> {
//! let config = ServerConfig::default()
//!     .http("0.0.0.0:8080".parse().unwrap())
//!     .fallback_http(None);
//! RelayServer::new(config).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod media;
pub mod multipart;
pub mod registry;
pub mod relay;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use media::Frame;
pub use relay::{Relay, RelayConfig, RelayHandle};
pub use server::{RelayServer, ServerConfig};
