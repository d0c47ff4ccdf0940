//! Relay core
//!
//! Owns the demultiplexer, the frame cache writer and the viewer registry.
//! Everything here runs on the relay task; nothing in this module locks or
//! waits.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::media::{FrameCache, FrameReader};
use crate::multipart::Demuxer;
use crate::registry::{
    ClientId, ClientRegistry, FanOutReport, RegistryError, ResumeExpired, SegmentSink,
};
use crate::stats::{RelayStats, ThroughputMeter, ThroughputSample};

use super::command::{ClientSignal, UpstreamEvent};
use super::config::RelayConfig;

/// Single-owner state of the relay
#[derive(Debug)]
pub struct RelayCore {
    config: RelayConfig,

    /// Demuxer of the current (or last) upstream session
    demuxer: Option<Demuxer>,

    /// Session whose data is accepted
    upstream_session: Option<u64>,

    /// Upstream sessions opened so far
    upstream_sessions: u64,

    cache: FrameCache,
    registry: ClientRegistry,
    meter: ThroughputMeter,
    last_sample: Option<ThroughputSample>,
}

impl RelayCore {
    /// Create the core
    ///
    /// The returned receiver carries resume timer expiries, which must be
    /// passed back through [`RelayCore::on_resume_expired`].
    pub fn new(config: RelayConfig) -> (Self, mpsc::UnboundedReceiver<ResumeExpired>) {
        let (registry, timers) = ClientRegistry::new(config.registry.clone());
        let meter = ThroughputMeter::new(config.stats_interval);

        (
            Self {
                config,
                demuxer: None,
                upstream_session: None,
                upstream_sessions: 0,
                cache: FrameCache::new(),
                registry,
                meter,
                last_sample: None,
            },
            timers,
        )
    }

    /// Reader for the latest-frame cache
    pub fn frames(&self) -> FrameReader {
        self.cache.reader()
    }

    /// Viewer registry
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Whether an upstream session is open
    pub fn upstream_connected(&self) -> bool {
        self.upstream_session.is_some()
    }

    /// Apply one upstream event
    ///
    /// Returns the fan-out report when the event completed a segment.
    pub fn handle_upstream(&mut self, event: UpstreamEvent) -> Option<FanOutReport> {
        match event {
            UpstreamEvent::Opened { session_id, peer } => {
                self.upstream_opened(session_id, peer);
                None
            }
            UpstreamEvent::Data { session_id, data } => self.ingest(session_id, &data),
            UpstreamEvent::Closed { session_id, reason } => {
                self.upstream_closed(session_id, reason.as_deref());
                None
            }
        }
    }

    fn upstream_opened(&mut self, session_id: u64, peer: std::net::SocketAddr) {
        if let (Some(previous), Some(demuxer)) =
            (self.upstream_session, self.demuxer.as_mut())
        {
            let discarded = demuxer.close();
            tracing::warn!(
                session_id = previous,
                discarded = discarded,
                "Upstream session superseded by new connection"
            );
        }

        self.demuxer = Some(Demuxer::new(
            self.config.boundary.clone(),
            self.config.max_pending_bytes,
        ));
        self.upstream_session = Some(session_id);
        self.upstream_sessions += 1;
        self.meter = ThroughputMeter::new(self.config.stats_interval);

        tracing::info!(session_id = session_id, peer = %peer, "MJPEG upstream connected");
    }

    /// Run one chunk through the demuxer and fan out any ready segment
    pub fn ingest(&mut self, session_id: u64, chunk: &[u8]) -> Option<FanOutReport> {
        if self.upstream_session != Some(session_id) {
            tracing::debug!(
                session_id = session_id,
                bytes = chunk.len(),
                "Dropping data from inactive upstream session"
            );
            return None;
        }
        let demuxer = self.demuxer.as_mut()?;

        let (report, forwarded) = match demuxer.push(chunk) {
            Ok(Some(segment)) => {
                if let Some(frame) = &segment.frame {
                    self.cache.publish(frame.clone());
                } else if let Some(err) = segment.frame_error() {
                    tracing::debug!(
                        session_id = session_id,
                        error = %err,
                        "Skipping cache update"
                    );
                }
                let report = self.registry.fan_out(&segment.data);
                (Some(report), segment.data.len())
            }
            Ok(None) => (None, 0),
            Err(e) => {
                tracing::warn!(
                    session_id = session_id,
                    error = %e,
                    "Upstream buffer overflow"
                );
                (None, 0)
            }
        };

        if let Some(sample) = self.meter.record(forwarded, Instant::now()) {
            tracing::debug!(
                bytes = sample.bytes,
                chunks = sample.chunks,
                bitrate = sample.bitrate(),
                viewers = self.registry.len(),
                "Upstream throughput"
            );
            self.last_sample = Some(sample);
        }

        report
    }

    fn upstream_closed(&mut self, session_id: u64, reason: Option<&str>) {
        if self.upstream_session != Some(session_id) {
            return;
        }
        self.upstream_session = None;

        let discarded = self.demuxer.as_mut().map(Demuxer::close).unwrap_or(0);
        tracing::warn!(
            session_id = session_id,
            discarded = discarded,
            reason = reason.unwrap_or("eof"),
            "{}",
            Error::UpstreamDisconnected
        );
    }

    /// Register a viewer
    pub fn subscribe(&mut self, sink: Box<dyn SegmentSink>) -> ClientId {
        self.registry.subscribe(sink)
    }

    /// Apply a flow-control signal from a viewer transport
    pub fn signal(&mut self, id: ClientId, signal: ClientSignal) -> Result<(), RegistryError> {
        match signal {
            ClientSignal::Pause => self.registry.pause(id),
            ClientSignal::Resume => self.registry.request_resume(id),
            ClientSignal::Stop => self.registry.unsubscribe(id),
        }
    }

    /// Apply a resume timer expiry
    pub fn on_resume_expired(&mut self, expired: ResumeExpired) -> bool {
        self.registry.on_resume_expired(expired)
    }

    /// Current statistics
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            upstream_connected: self.upstream_connected(),
            upstream_sessions: self.upstream_sessions,
            demux: self
                .demuxer
                .as_ref()
                .map(|d| d.stats().clone())
                .unwrap_or_default(),
            throughput: self.last_sample,
            has_frame: self.cache.latest().is_some(),
            clients: self.registry.client_stats(),
        }
    }

    /// Stop every viewer and close ingestion
    pub fn shutdown(&mut self) {
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.close();
        }
        self.upstream_session = None;
        self.registry.stop_all();
    }
}
