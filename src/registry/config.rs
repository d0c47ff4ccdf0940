//! Registry configuration

use std::time::Duration;

/// Configuration for the viewer registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a producer stays paused after a resume request
    pub resume_cooldown: Duration,

    /// Segments a viewer may have queued before it counts as congested
    pub viewer_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            resume_cooldown: Duration::from_secs(1),
            viewer_buffer: 16,
        }
    }
}

impl RegistryConfig {
    /// Set the resume cooldown
    pub fn resume_cooldown(mut self, cooldown: Duration) -> Self {
        self.resume_cooldown = cooldown;
        self
    }

    /// Set the per-viewer queue depth (at least 1)
    pub fn viewer_buffer(mut self, segments: usize) -> Self {
        self.viewer_buffer = segments.max(1);
        self
    }
}
