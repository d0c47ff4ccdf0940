//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::relay::RelayConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the camera source connects to
    pub upstream_addr: SocketAddr,

    /// Address for the HTTP viewer endpoints
    pub http_addr: SocketAddr,

    /// Tried when `http_addr` cannot be bound (e.g. port 80 without privileges)
    pub fallback_http_addr: Option<SocketAddr>,

    /// Directory served for paths that are not relay endpoints
    pub web_root: PathBuf,

    /// Enable TCP_NODELAY on the upstream socket
    pub tcp_nodelay: bool,

    /// Read buffer size for the upstream socket
    pub read_buffer_size: usize,

    /// Relay core settings
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upstream_addr: SocketAddr::from(([0, 0, 0, 0], 9999)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            fallback_http_addr: Some(SocketAddr::from(([0, 0, 0, 0], 8080))),
            web_root: PathBuf::from("web"),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024, // 64KB
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the upstream listen address
    pub fn upstream(mut self, addr: SocketAddr) -> Self {
        self.upstream_addr = addr;
        self
    }

    /// Set the HTTP listen address
    pub fn http(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Set or clear the HTTP fallback address
    pub fn fallback_http(mut self, addr: Option<SocketAddr>) -> Self {
        self.fallback_http_addr = addr;
        self
    }

    /// Set the static file directory
    pub fn web_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.web_root = path.into();
        self
    }

    /// Set the upstream read buffer size (at least 1KB)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1024);
        self
    }

    /// Set the relay configuration
    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }
}
