//! Messages into the relay task

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::registry::{ClientId, SegmentSink};
use crate::stats::RelayStats;

/// Flow-control signal from a viewer transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSignal {
    /// Transport cannot take more bytes right now
    Pause,
    /// Transport is ready again; resumes after the cooldown
    Resume,
    /// Transport closed
    Stop,
}

/// Control messages
pub(crate) enum Command {
    Subscribe {
        sink: Box<dyn SegmentSink>,
        reply: oneshot::Sender<ClientId>,
    },
    Signal {
        id: ClientId,
        signal: ClientSignal,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
    Shutdown,
}

/// Events from an upstream ingest session, in arrival order
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A camera source connected
    Opened { session_id: u64, peer: SocketAddr },
    /// Bytes read from the camera source
    Data { session_id: u64, data: Bytes },
    /// The camera source went away
    Closed {
        session_id: u64,
        reason: Option<String>,
    },
}
