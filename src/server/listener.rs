//! Relay server listeners
//!
//! Accepts the camera source on the upstream port, serves viewers over HTTP,
//! and runs the relay task behind both.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::relay::{Relay, RelayHandle};
use crate::server::config::ServerConfig;
use crate::server::http;

/// MJPEG relay server
pub struct RelayServer {
    config: ServerConfig,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server
    ///
    /// This method blocks until a listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (relay, handle) = Relay::new(self.config.relay.clone());
        let relay_task = tokio::spawn(relay.run());

        let upstream = UpstreamListener::bind(&self.config, handle.clone()).await?;
        let http_listener =
            http::bind_with_fallback(self.config.http_addr, self.config.fallback_http_addr)
                .await?;
        let app = http::router(handle.clone(), &self.config.web_root);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = upstream.run() => result,
            result = axum::serve(http_listener, app).into_future() => result.map_err(Error::from),
        };

        handle.shutdown();
        if let Err(e) = relay_task.await {
            tracing::error!(error = %e, "Relay task failed");
        }

        result
    }
}

/// Accepts camera source connections and feeds them to the relay
pub struct UpstreamListener {
    listener: TcpListener,
    relay: RelayHandle,
    tcp_nodelay: bool,
    read_buffer_size: usize,
}

impl UpstreamListener {
    /// Bind the upstream port
    pub async fn bind(config: &ServerConfig, relay: RelayHandle) -> Result<Self> {
        let listener = TcpListener::bind(config.upstream_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Listening for MJPEG upstream");

        Ok(Self {
            listener,
            relay,
            tcp_nodelay: config.tcp_nodelay,
            read_buffer_size: config.read_buffer_size,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept upstream connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        if self.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure socket");
            }
        }

        let relay = self.relay.clone();
        let read_buffer_size = self.read_buffer_size;

        tokio::spawn(async move {
            if let Err(e) = ingest(socket, peer_addr, relay, read_buffer_size).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Upstream ingest ended");
            }
        });
    }
}

/// Read one camera connection until it ends
///
/// Always returns an error: `UpstreamDisconnected` on EOF, `Io` on a read
/// failure, or `RelayClosed` if the relay went away first.
async fn ingest(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    relay: RelayHandle,
    read_buffer_size: usize,
) -> Result<()> {
    let session = relay.open_upstream(peer_addr).await?;
    let mut buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        buf.reserve(read_buffer_size);

        match socket.read_buf(&mut buf).await {
            Ok(0) => {
                session.close(None).await;
                return Err(Error::UpstreamDisconnected);
            }
            Ok(_) => session.send(buf.split().freeze()).await?,
            Err(e) => {
                session.close(Some(e.to_string())).await;
                return Err(e.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::relay::RelayConfig;

    fn test_config() -> ServerConfig {
        ServerConfig::default()
            .upstream("127.0.0.1:0".parse().unwrap())
            .relay(RelayConfig::default().boundary("BOUND"))
    }

    async fn wait_for_frame(relay: &RelayHandle) -> Vec<u8> {
        for _ in 0..100 {
            if let Some(frame) = relay.latest_frame() {
                return frame.data.to_vec();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no frame arrived");
    }

    #[tokio::test]
    async fn test_upstream_connection_feeds_relay() {
        let (relay, handle) = Relay::new(test_config().relay);
        tokio::spawn(relay.run());

        let listener = UpstreamListener::bind(&test_config(), handle.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run());

        let mut camera = TcpStream::connect(addr).await.unwrap();
        camera
            .write_all(b"JUNK\xFF\xD8\xFFIMG1--BO")
            .await
            .unwrap();
        camera.write_all(b"UND\r\n").await.unwrap();

        assert_eq!(wait_for_frame(&handle).await, b"\xFF\xD8\xFFIMG1");
    }

    #[tokio::test]
    async fn test_upstream_eof_closes_session() {
        let (relay, handle) = Relay::new(test_config().relay);
        tokio::spawn(relay.run());

        let listener = UpstreamListener::bind(&test_config(), handle.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run());

        let mut camera = TcpStream::connect(addr).await.unwrap();
        camera.write_all(b"\xFF\xD8\xFFA--BOUND\r\n").await.unwrap();
        wait_for_frame(&handle).await;
        drop(camera);

        for _ in 0..100 {
            let stats = handle.stats().await.unwrap();
            if !stats.upstream_connected {
                assert!(stats.has_frame);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("upstream never reported closed");
    }
}
