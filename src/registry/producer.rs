//! Per-viewer flow control
//!
//! Each viewer is driven by a push producer with three states:
//!
//! ```text
//!            pause / Full            resume timer fires
//!  Active ───────────────► Paused ───────────────────────► Active
//!    │                       │
//!    └──── stop / Closed ────┴──────────► Stopped (terminal)
//! ```
//!
//! A resume request does not resume immediately. It (re)arms a cooldown
//! timer and the producer becomes Active when that timer fires, whether or
//! not the transport confirms anything else in the meantime. Every new
//! request cancels the previous timer, and a generation number lets the
//! owner discard an expiry that was already in flight when it was cancelled.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::sink::{SegmentSink, WriteOutcome};

/// Identifier of a registered viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Flow-control state of a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Receives every segment
    Active,
    /// Skipped by fan-out until the resume timer fires
    Paused,
    /// Terminal; never written to again
    Stopped,
}

/// Message sent by a resume timer when its cooldown elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeExpired {
    /// Producer the timer belongs to
    pub client_id: ClientId,
    /// Generation at the time the timer was armed
    pub generation: u64,
}

/// One viewer's producer
pub struct ClientProducer {
    id: ClientId,
    sink: Box<dyn SegmentSink>,
    state: ProducerState,
    resume_timer: Option<JoinHandle<()>>,
    generation: u64,
    segments_written: u64,
    segments_skipped: u64,
    bytes_written: u64,
}

impl ClientProducer {
    /// Create an Active producer writing to `sink`
    pub fn new(id: ClientId, sink: Box<dyn SegmentSink>) -> Self {
        Self {
            id,
            sink,
            state: ProducerState::Active,
            resume_timer: None,
            generation: 0,
            segments_written: 0,
            segments_skipped: 0,
            bytes_written: 0,
        }
    }

    /// Viewer ID
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Whether fan-out should write to this producer
    pub fn is_active(&self) -> bool {
        self.state == ProducerState::Active
    }

    /// Whether a resume timer is armed
    pub fn has_pending_resume(&self) -> bool {
        self.resume_timer.is_some()
    }

    /// Segments delivered to the transport
    pub fn segments_written(&self) -> u64 {
        self.segments_written
    }

    /// Segments not delivered because the producer was paused
    pub fn segments_skipped(&self) -> u64 {
        self.segments_skipped
    }

    /// Bytes delivered to the transport
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Stop writing until a resume timer fires
    pub fn pause(&mut self) {
        if self.state == ProducerState::Stopped {
            return;
        }
        self.cancel_resume_timer();
        self.state = ProducerState::Paused;
    }

    /// Arm (or re-arm) the resume timer
    ///
    /// When `cooldown` elapses a [`ResumeExpired`] is sent on `timers`; feed it
    /// back through [`ClientProducer::on_resume_expired`]. Ignored once stopped.
    pub fn request_resume(
        &mut self,
        cooldown: Duration,
        timers: &mpsc::UnboundedSender<ResumeExpired>,
    ) {
        if self.state == ProducerState::Stopped {
            return;
        }
        self.cancel_resume_timer();
        self.generation += 1;

        let expired = ResumeExpired {
            client_id: self.id,
            generation: self.generation,
        };
        let timers = timers.clone();
        self.resume_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let _ = timers.send(expired);
        }));
    }

    /// Handle a timer expiry; returns true if the producer became Active
    pub fn on_resume_expired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.resume_timer.is_none() {
            return false;
        }
        self.resume_timer = None;

        match self.state {
            ProducerState::Paused => {
                self.state = ProducerState::Active;
                true
            }
            ProducerState::Active | ProducerState::Stopped => false,
        }
    }

    /// Record a segment this producer missed while not Active
    pub fn skip(&mut self) {
        if self.state == ProducerState::Paused {
            self.segments_skipped += 1;
        }
    }

    /// Offer a segment to the transport
    ///
    /// Only Active producers write. A congested transport pauses the producer
    /// and the segment is dropped for this viewer. Writing to a stopped
    /// producer is a no-op reported as `Closed`.
    pub fn write(&mut self, segment: &Bytes) -> WriteOutcome {
        match self.state {
            ProducerState::Stopped => {
                tracing::debug!(client_id = %self.id, "Write to stopped producer ignored");
                return WriteOutcome::Closed;
            }
            ProducerState::Paused => {
                self.segments_skipped += 1;
                return WriteOutcome::Full;
            }
            ProducerState::Active => {}
        }

        let outcome = self.sink.try_write(segment);
        match outcome {
            WriteOutcome::Written => {
                self.segments_written += 1;
                self.bytes_written += segment.len() as u64;
            }
            WriteOutcome::Full => {
                self.segments_skipped += 1;
                self.pause();
            }
            WriteOutcome::Closed => {}
        }
        outcome
    }

    /// Enter the terminal state, cancelling any timer and releasing the sink
    pub fn stop(&mut self) {
        if self.state == ProducerState::Stopped {
            return;
        }
        self.cancel_resume_timer();
        self.state = ProducerState::Stopped;
        self.sink.close();
    }

    fn cancel_resume_timer(&mut self) {
        if let Some(timer) = self.resume_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ClientProducer {
    fn drop(&mut self) {
        self.cancel_resume_timer();
    }
}

impl std::fmt::Debug for ClientProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProducer")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("segments_written", &self.segments_written)
            .finish()
    }
}
