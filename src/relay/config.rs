//! Relay configuration

use std::time::Duration;

use crate::multipart::Boundary;
use crate::registry::RegistryConfig;

/// Configuration for the relay core
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Multipart boundary used by the upstream stream and sent to viewers
    pub boundary: Boundary,

    /// Cap on bytes held while waiting for a boundary
    pub max_pending_bytes: usize,

    /// Upstream events that may be queued for the relay task
    pub chunk_queue: usize,

    /// Throughput logging window
    pub stats_interval: Duration,

    /// Viewer registry settings
    pub registry: RegistryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            boundary: Boundary::default(),
            max_pending_bytes: 8 * 1024 * 1024, // 8MB
            chunk_queue: 64,
            stats_interval: Duration::from_secs(1),
            registry: RegistryConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Set the boundary name
    pub fn boundary(mut self, name: impl Into<String>) -> Self {
        self.boundary = Boundary::new(name);
        self
    }

    /// Set the pending-bytes cap
    pub fn max_pending_bytes(mut self, bytes: usize) -> Self {
        self.max_pending_bytes = bytes;
        self
    }

    /// Set the resume cooldown for paused viewers
    pub fn resume_cooldown(mut self, cooldown: Duration) -> Self {
        self.registry = self.registry.resume_cooldown(cooldown);
        self
    }

    /// Set the per-viewer queue depth
    pub fn viewer_buffer(mut self, segments: usize) -> Self {
        self.registry = self.registry.viewer_buffer(segments);
        self
    }
}
