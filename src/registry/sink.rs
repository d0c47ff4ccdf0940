//! Viewer transport capability
//!
//! The registry never talks to sockets directly. Each transport kind
//! implements [`SegmentSink`] once: a non-blocking write that either accepts
//! the segment, reports that the transport is congested, or reports that the
//! transport is gone.
//!
//! [`viewer_channel`] is the implementation used for HTTP viewers. Segments go
//! into a bounded queue that the response body drains; a full queue is the
//! congestion signal, and the draining side notices when it has caught up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Result of offering a segment to a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Segment was queued for the viewer
    Written,
    /// Transport cannot take more right now; segment was not queued
    Full,
    /// Transport is closed or failed
    Closed,
}

/// Non-blocking write side of a viewer transport
pub trait SegmentSink: Send + 'static {
    /// Offer a segment without waiting
    fn try_write(&mut self, segment: &Bytes) -> WriteOutcome;

    /// Release the transport; called once when the producer stops
    fn close(&mut self) {}
}

/// Create a bounded segment queue for one viewer
pub fn viewer_channel(capacity: usize) -> (ChannelSink, ViewerFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let congested = Arc::new(AtomicBool::new(false));

    (
        ChannelSink {
            tx: Some(tx),
            congested: Arc::clone(&congested),
        },
        ViewerFeed { rx, congested },
    )
}

/// Registry side of a viewer queue
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Bytes>>,
    congested: Arc<AtomicBool>,
}

impl SegmentSink for ChannelSink {
    fn try_write(&mut self, segment: &Bytes) -> WriteOutcome {
        let Some(tx) = self.tx.as_ref() else {
            return WriteOutcome::Closed;
        };

        match tx.try_send(segment.clone()) {
            Ok(()) => WriteOutcome::Written,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.congested.store(true, Ordering::Release);
                WriteOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => WriteOutcome::Closed,
        }
    }

    fn close(&mut self) {
        // Dropping the sender ends the viewer's body once it drains
        self.tx = None;
    }
}

/// Transport side of a viewer queue
#[derive(Debug)]
pub struct ViewerFeed {
    rx: mpsc::Receiver<Bytes>,
    congested: Arc<AtomicBool>,
}

impl ViewerFeed {
    /// Receive the next segment, `None` once the sink is closed and drained
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Poll form of [`ViewerFeed::recv`]
    pub fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }

    /// If the sink hit a full queue and the queue has since drained, clear the
    /// flag and return true; the caller should then ask for a resume.
    pub fn take_drained(&mut self) -> bool {
        self.rx.is_empty() && self.congested.swap(false, Ordering::AcqRel)
    }
}
