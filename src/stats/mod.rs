//! Statistics and diagnostics for the relay

pub mod metrics;

pub use metrics::{RelayStats, ThroughputMeter, ThroughputSample};
