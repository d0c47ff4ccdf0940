//! Relay service
//!
//! [`Relay`] runs the [`RelayCore`] on a single task. Everything else talks to
//! it through channels:
//!
//! ```text
//!   ingest task ──UpstreamEvent (bounded)──┐
//!   viewers     ──Command (unbounded)──────┼──► Relay::run() ──► RelayCore
//!   timers      ──ResumeExpired────────────┘
//! ```
//!
//! Upstream events go through a bounded queue so a stalled relay task pushes
//! back on the camera socket rather than buffering without limit. Control
//! commands are unbounded so handles can send from `Drop`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::media::{Frame, FrameReader};
use crate::multipart::Boundary;
use crate::registry::{
    viewer_channel, ClientId, RegistryError, ResumeExpired, SegmentSink, ViewerFeed,
};
use crate::stats::RelayStats;

use super::command::{ClientSignal, Command, UpstreamEvent};
use super::config::RelayConfig;
use super::core::RelayCore;

/// Upstream events served in a row before control messages get a turn
pub const UPSTREAM_BURST: usize = 32;

/// The relay service
///
/// Construct with [`Relay::new`], take a [`RelayHandle`], then drive it with
/// [`Relay::run`]. The task ends on [`RelayHandle::shutdown`] or when every
/// handle has been dropped; either way all viewers are stopped.
pub struct Relay {
    core: RelayCore,
    commands: mpsc::UnboundedReceiver<Command>,
    upstream: mpsc::Receiver<UpstreamEvent>,
    timers: mpsc::UnboundedReceiver<ResumeExpired>,
}

impl Relay {
    /// Create the relay and its first handle
    pub fn new(config: RelayConfig) -> (Self, RelayHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (upstream_tx, upstream) = mpsc::channel(config.chunk_queue.max(1));
        let viewer_buffer = config.registry.viewer_buffer;
        let boundary = config.boundary.clone();
        let (core, timers) = RelayCore::new(config);

        let handle = RelayHandle {
            commands: command_tx,
            upstream: upstream_tx,
            frames: core.frames(),
            boundary,
            viewer_buffer,
            next_session_id: Arc::new(AtomicU64::new(1)),
        };

        (
            Self {
                core,
                commands,
                upstream,
                timers,
            },
            handle,
        )
    }

    /// Run until shut down
    ///
    /// Upstream events are served first, so events a caller has already
    /// queued are applied before any command it sends afterwards. After
    /// [`UPSTREAM_BURST`] upstream events in a row, pending timer expiries and
    /// commands are applied before the queue is read again; a camera that
    /// keeps the queue full cannot hold off viewers indefinitely.
    pub async fn run(mut self) {
        tracing::debug!("Relay task started");
        let mut burst = 0;

        loop {
            tokio::select! {
                biased;

                Some(event) = self.upstream.recv() => {
                    self.core.handle_upstream(event);
                    burst += 1;
                    if burst >= UPSTREAM_BURST {
                        burst = 0;
                        if !self.drain_control() {
                            break;
                        }
                    }
                }
                Some(expired) = self.timers.recv() => {
                    burst = 0;
                    self.core.on_resume_expired(expired);
                }
                command = self.commands.recv() => {
                    burst = 0;
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
            }
        }

        self.core.shutdown();
        tracing::info!("Relay stopped");
    }

    /// Apply everything already queued on the control side; false on shutdown
    fn drain_control(&mut self) -> bool {
        while let Ok(expired) = self.timers.try_recv() {
            self.core.on_resume_expired(expired);
        }

        loop {
            match self.commands.try_recv() {
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { sink, reply } => {
                let id = self.core.subscribe(sink);
                if reply.send(id).is_err() {
                    // Requester went away before the reply; don't leak the viewer
                    let _ = self.core.signal(id, ClientSignal::Stop);
                }
            }
            Command::Signal { id, signal } => {
                if let Err(e) = self.core.signal(id, signal) {
                    tracing::debug!(
                        client_id = %id,
                        signal = ?signal,
                        error = %e,
                        "Signal ignored"
                    );
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.core.stats());
            }
            Command::Shutdown => {}
        }
    }
}

/// Cloneable front door to a running relay
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<Command>,
    upstream: mpsc::Sender<UpstreamEvent>,
    frames: FrameReader,
    boundary: Boundary,
    viewer_buffer: usize,
    next_session_id: Arc<AtomicU64>,
}

impl RelayHandle {
    /// Latest complete frame, `None` if none has arrived yet
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest()
    }

    /// Boundary used on the viewer stream
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Register a viewer with a custom transport
    pub async fn subscribe(&self, sink: Box<dyn SegmentSink>) -> Result<ClientHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { sink, reply })?;
        let id = rx.await.map_err(|_| RegistryError::RelayClosed)?;

        Ok(ClientHandle {
            id,
            commands: self.commands.clone(),
            stopped: false,
        })
    }

    /// Register a viewer fed through a bounded queue
    pub async fn open_viewer(&self) -> Result<(ClientHandle, ViewerFeed)> {
        let (sink, feed) = viewer_channel(self.viewer_buffer);
        let client = self.subscribe(Box::new(sink)).await?;
        Ok((client, feed))
    }

    /// Start a new upstream ingest session
    ///
    /// A new session replaces any session that is still open.
    pub async fn open_upstream(&self, peer: SocketAddr) -> Result<UpstreamSession> {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.upstream
            .send(UpstreamEvent::Opened { session_id, peer })
            .await
            .map_err(|_| RegistryError::RelayClosed)?;

        Ok(UpstreamSession {
            session_id,
            tx: self.upstream.clone(),
            closed: false,
        })
    }

    /// Snapshot of relay statistics
    pub async fn stats(&self) -> Result<RelayStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        Ok(rx.await.map_err(|_| RegistryError::RelayClosed)?)
    }

    /// Ask the relay task to stop
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Registry(RegistryError::RelayClosed))
    }
}

/// A viewer's connection to the relay
///
/// Dropping the handle stops the viewer.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    commands: mpsc::UnboundedSender<Command>,
    stopped: bool,
}

impl ClientHandle {
    /// Viewer ID
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Transport cannot take more bytes
    pub fn pause(&self) {
        self.signal(ClientSignal::Pause);
    }

    /// Transport is ready again; the viewer resumes after the cooldown
    pub fn resume(&self) {
        self.signal(ClientSignal::Resume);
    }

    /// Stop the viewer
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.signal(ClientSignal::Stop);
        }
    }

    fn signal(&self, signal: ClientSignal) {
        if self.stopped && signal != ClientSignal::Stop {
            return;
        }
        // Relay already gone means the viewer is already stopped
        let _ = self.commands.send(Command::Signal {
            id: self.id,
            signal,
        });
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Write side of one upstream connection
///
/// Dropping it without [`UpstreamSession::close`] still closes the session,
/// provided the relay queue has room.
#[derive(Debug)]
pub struct UpstreamSession {
    session_id: u64,
    tx: mpsc::Sender<UpstreamEvent>,
    closed: bool,
}

impl UpstreamSession {
    /// Session ID
    pub fn id(&self) -> u64 {
        self.session_id
    }

    /// Forward bytes read from the camera source
    pub async fn send(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(UpstreamEvent::Data {
                session_id: self.session_id,
                data,
            })
            .await
            .map_err(|_| Error::Registry(RegistryError::RelayClosed))
    }

    /// End the session
    pub async fn close(mut self, reason: Option<String>) {
        self.closed = true;
        let _ = self
            .tx
            .send(UpstreamEvent::Closed {
                session_id: self.session_id,
                reason,
            })
            .await;
    }
}

impl Drop for UpstreamSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.tx.try_send(UpstreamEvent::Closed {
                session_id: self.session_id,
                reason: Some("session dropped".to_string()),
            });
        }
    }
}
