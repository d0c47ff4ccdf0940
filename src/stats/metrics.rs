//! Statistics and metrics for the relay

use std::time::{Duration, Instant};

use crate::multipart::DemuxStats;
use crate::registry::ClientStats;

/// Bytes forwarded over one measurement window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    /// Bytes forwarded to fan-out during the window
    pub bytes: u64,
    /// Upstream chunks processed during the window
    pub chunks: u64,
    /// Actual length of the window
    pub elapsed: Duration,
}

impl ThroughputSample {
    /// Forwarded bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let millis = self.elapsed.as_millis() as u64;
        if millis > 0 {
            self.bytes * 8 * 1000 / millis
        } else {
            0
        }
    }
}

/// Rolling throughput counter
///
/// Purely diagnostic. Call [`ThroughputMeter::record`] once per upstream
/// chunk; a sample is returned each time the window has elapsed.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    started_at: Instant,
    bytes: u64,
    chunks: u64,
}

impl ThroughputMeter {
    /// Create a meter with the given window
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Create a meter whose first window starts at `now`
    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            started_at: now,
            bytes: 0,
            chunks: 0,
        }
    }

    /// Account for one processed chunk that forwarded `bytes`
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<ThroughputSample> {
        self.bytes += bytes as u64;
        self.chunks += 1;

        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed <= self.window {
            return None;
        }

        let sample = ThroughputSample {
            bytes: self.bytes,
            chunks: self.chunks,
            elapsed,
        };
        self.started_at = now;
        self.bytes = 0;
        self.chunks = 0;
        Some(sample)
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Relay-wide statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Whether an upstream camera connection is currently open
    pub upstream_connected: bool,
    /// Upstream connections accepted so far
    pub upstream_sessions: u64,
    /// Counters of the current (or last) upstream session
    pub demux: DemuxStats,
    /// Most recent throughput sample
    pub throughput: Option<ThroughputSample>,
    /// Whether a frame is cached
    pub has_frame: bool,
    /// Registered viewers in subscription order
    pub clients: Vec<ClientStats>,
}

impl RelayStats {
    /// Number of registered viewers
    pub fn viewer_count(&self) -> usize {
        self.clients.len()
    }
}
