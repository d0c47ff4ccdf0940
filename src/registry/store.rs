//! Viewer registry implementation
//!
//! Holds every subscribed viewer's producer in subscription order and fans
//! ready segments out to them. Owned by a single task, so no locking.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::producer::{ClientId, ClientProducer, ProducerState, ResumeExpired};
use super::sink::{SegmentSink, WriteOutcome};

/// What happened to one segment during fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Viewers the segment was queued for
    pub delivered: usize,
    /// Viewers skipped because they were already paused
    pub skipped: usize,
    /// Viewers that became paused on this segment
    pub paused: usize,
    /// Viewers whose transport failed; they were stopped and removed
    pub failed: usize,
}

/// Snapshot of one registered viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// Viewer ID
    pub id: ClientId,
    /// Flow-control state
    pub state: ProducerState,
    /// Segments delivered
    pub segments_written: u64,
    /// Segments dropped while paused
    pub segments_skipped: u64,
    /// Bytes delivered
    pub bytes_written: u64,
}

/// Ordered collection of viewer producers
pub struct ClientRegistry {
    /// Producers in subscription order
    clients: Vec<ClientProducer>,

    /// Next ID to hand out
    next_id: u64,

    /// Resume timers report here
    timer_tx: mpsc::UnboundedSender<ResumeExpired>,

    /// Configuration
    config: RegistryConfig,
}

impl ClientRegistry {
    /// Create an empty registry
    ///
    /// The returned receiver yields resume timer expiries; the owner must feed
    /// them back through [`ClientRegistry::on_resume_expired`].
    pub fn new(config: RegistryConfig) -> (Self, mpsc::UnboundedReceiver<ResumeExpired>) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        (
            Self {
                clients: Vec::new(),
                next_id: 1,
                timer_tx,
                config,
            },
            timer_rx,
        )
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Resume cooldown in effect
    pub fn resume_cooldown(&self) -> Duration {
        self.config.resume_cooldown
    }

    /// Register a new viewer in the Active state
    pub fn subscribe(&mut self, sink: Box<dyn SegmentSink>) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;

        self.clients.push(ClientProducer::new(id, sink));

        tracing::info!(client_id = %id, viewers = self.clients.len(), "Viewer subscribed");

        id
    }

    /// Stop a viewer and remove it
    pub fn unsubscribe(&mut self, id: ClientId) -> Result<(), RegistryError> {
        let index = self.position(id)?;
        let mut producer = self.clients.remove(index);
        producer.stop();

        tracing::info!(
            client_id = %id,
            segments = producer.segments_written(),
            bytes = producer.bytes_written(),
            viewers = self.clients.len(),
            "Viewer unsubscribed"
        );

        Ok(())
    }

    /// Pause a viewer on request of its transport
    pub fn pause(&mut self, id: ClientId) -> Result<(), RegistryError> {
        let producer = self.get_mut(id)?;
        producer.pause();

        tracing::debug!(client_id = %id, "Viewer paused");
        Ok(())
    }

    /// Ask for a viewer to resume after the cooldown
    pub fn request_resume(&mut self, id: ClientId) -> Result<(), RegistryError> {
        let cooldown = self.config.resume_cooldown;
        let timer_tx = self.timer_tx.clone();
        let producer = self.get_mut(id)?;
        producer.request_resume(cooldown, &timer_tx);

        tracing::debug!(
            client_id = %id,
            cooldown_ms = cooldown.as_millis() as u64,
            "Viewer resume scheduled"
        );
        Ok(())
    }

    /// Apply a resume timer expiry
    ///
    /// Expiries for viewers that are gone, or for timers that were replaced,
    /// are ignored.
    pub fn on_resume_expired(&mut self, expired: ResumeExpired) -> bool {
        let Ok(producer) = self.get_mut(expired.client_id) else {
            return false;
        };

        let resumed = producer.on_resume_expired(expired.generation);
        if resumed {
            tracing::debug!(client_id = %expired.client_id, "Viewer resumed");
        }
        resumed
    }

    /// Write a segment to every Active viewer, in subscription order
    ///
    /// A failing viewer never keeps the segment from the ones after it; failed
    /// viewers are stopped and removed once the pass is complete.
    pub fn fan_out(&mut self, segment: &Bytes) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut failed = Vec::new();

        for producer in &mut self.clients {
            if !producer.is_active() {
                producer.skip();
                report.skipped += 1;
                continue;
            }

            match producer.write(segment) {
                WriteOutcome::Written => report.delivered += 1,
                WriteOutcome::Full => {
                    report.paused += 1;
                    tracing::debug!(client_id = %producer.id(), "Viewer congested, paused");
                }
                WriteOutcome::Closed => failed.push(producer.id()),
            }
        }

        for id in failed {
            tracing::warn!(client_id = %id, "Viewer transport failed");
            if self.unsubscribe(id).is_ok() {
                report.failed += 1;
            }
        }

        report
    }

    /// Stop and remove every viewer
    pub fn stop_all(&mut self) -> usize {
        let count = self.clients.len();
        for producer in &mut self.clients {
            producer.stop();
        }
        self.clients.clear();

        if count > 0 {
            tracing::info!(viewers = count, "All viewers stopped");
        }
        count
    }

    /// State of a viewer, `None` if it is not registered
    pub fn state(&self, id: ClientId) -> Option<ProducerState> {
        self.clients
            .iter()
            .find(|p| p.id() == id)
            .map(ClientProducer::state)
    }

    /// Per-viewer statistics in subscription order
    pub fn client_stats(&self) -> Vec<ClientStats> {
        self.clients
            .iter()
            .map(|p| ClientStats {
                id: p.id(),
                state: p.state(),
                segments_written: p.segments_written(),
                segments_skipped: p.segments_skipped(),
                bytes_written: p.bytes_written(),
            })
            .collect()
    }

    /// Number of registered viewers
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no viewers are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn position(&self, id: ClientId) -> Result<usize, RegistryError> {
        self.clients
            .iter()
            .position(|p| p.id() == id)
            .ok_or(RegistryError::ClientNotFound(id))
    }

    fn get_mut(&mut self, id: ClientId) -> Result<&mut ClientProducer, RegistryError> {
        self.clients
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or(RegistryError::ClientNotFound(id))
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.clients)
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish()
    }
}
