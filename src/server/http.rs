//! HTTP viewer endpoints
//!
//! | Path            | Response                                              |
//! |-----------------|-------------------------------------------------------|
//! | `/stream.mjpeg` | endless `multipart/x-mixed-replace` relay of upstream  |
//! | `/latest.jpeg`  | most recent frame, or `204 No Content` before the first |
//! | `/ping`         | `{"status":"ready"}`                                  |
//! | `/getConfig`    | tunable parameters as JSON (currently none: `{}`)     |
//! | `/updateConfig` | accepts parameters as query string, `{"status":"done"}` |
//! | anything else   | static files from the web root                        |

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::Stream;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::registry::ViewerFeed;
use crate::relay::{ClientHandle, RelayHandle};

/// Build the HTTP router
pub fn router(relay: RelayHandle, web_root: &Path) -> Router {
    Router::new()
        .route("/stream.mjpeg", get(stream_mjpeg))
        .route("/latest.jpeg", get(latest_jpeg))
        .route("/ping", get(ping))
        .route("/getConfig", get(get_config))
        .route("/updateConfig", get(update_config))
        .fallback_service(ServeDir::new(web_root))
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// Bind `addr`, falling back to `fallback` if that fails
pub async fn bind_with_fallback(
    addr: SocketAddr,
    fallback: Option<SocketAddr>,
) -> std::io::Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!(addr = %listener.local_addr()?, "Started webserver");
            Ok(listener)
        }
        Err(e) => {
            let Some(fallback) = fallback else {
                return Err(e);
            };
            tracing::warn!(addr = %addr, error = %e, "Cannot bind webserver, trying fallback");
            let listener = TcpListener::bind(fallback).await?;
            tracing::info!(addr = %listener.local_addr()?, "Started webserver");
            Ok(listener)
        }
    }
}

async fn stream_mjpeg(State(relay): State<RelayHandle>) -> Response {
    let (client, feed) = match relay.open_viewer().await {
        Ok(viewer) => viewer,
        Err(e) => {
            tracing::error!(error = %e, "Cannot register viewer");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    tracing::info!(client_id = %client.id(), "New viewer of image stream");

    (
        [
            (header::CONTENT_TYPE, relay.boundary().content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(ViewerStream::new(client, feed)),
    )
        .into_response()
}

async fn latest_jpeg(State(relay): State<RelayHandle>) -> Response {
    match relay.latest_frame() {
        Some(frame) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            frame.data,
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn ping() -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(serde_json::json!({ "status": "ready" })),
    )
}

async fn get_config() -> impl IntoResponse {
    Json(serde_json::json!({}))
}

async fn update_config(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    // No runtime-tunable parameters yet; unknown names are ignored
    for (name, value) in &params {
        tracing::info!(param = %name, value = %value, "Ignoring unknown config parameter");
    }
    Json(serde_json::json!({ "status": "done" }))
}

/// Response body of one viewer
///
/// Drains the viewer queue into the HTTP response. When the queue has run dry
/// after the relay found it full, the viewer asks to be resumed. Dropping the
/// body (client went away) stops the viewer.
pub struct ViewerStream {
    client: ClientHandle,
    feed: ViewerFeed,
}

impl ViewerStream {
    /// Wrap a registered viewer
    pub fn new(client: ClientHandle, feed: ViewerFeed) -> Self {
        Self { client, feed }
    }
}

impl Stream for ViewerStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.feed.poll_recv(cx) {
            Poll::Ready(Some(segment)) => Poll::Ready(Some(Ok(segment))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if this.feed.take_drained() {
                    this.client.resume();
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for ViewerStream {
    fn drop(&mut self) {
        tracing::info!(client_id = %self.client.id(), "Connection to viewer lost");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::registry::ProducerState;
    use crate::relay::{Relay, RelayConfig};

    fn spawn_relay(config: RelayConfig) -> RelayHandle {
        let (relay, handle) = Relay::new(config.boundary("BOUND"));
        tokio::spawn(relay.run());
        handle
    }

    fn part(payload: &[u8]) -> Bytes {
        Bytes::from([&b"\xFF\xD8\xFF"[..], payload, &b"--BOUND\r\n"[..]].concat())
    }

    #[tokio::test]
    async fn test_viewer_stream_yields_segments() {
        let relay = spawn_relay(RelayConfig::default());
        let (client, feed) = relay.open_viewer().await.unwrap();
        let mut stream = ViewerStream::new(client, feed);
        let upstream = relay.open_upstream("127.0.0.1:1".parse().unwrap()).await.unwrap();

        upstream.send(part(b"a")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), part(b"a"));
    }

    #[tokio::test]
    async fn test_viewer_stream_drop_stops_viewer() {
        let relay = spawn_relay(RelayConfig::default());
        let (client, feed) = relay.open_viewer().await.unwrap();
        let stream = ViewerStream::new(client, feed);
        assert_eq!(relay.stats().await.unwrap().viewer_count(), 1);

        drop(stream);
        assert_eq!(relay.stats().await.unwrap().viewer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_stream_requests_resume() {
        let relay = spawn_relay(RelayConfig::default().viewer_buffer(1));
        let (client, feed) = relay.open_viewer().await.unwrap();
        let mut stream = tokio_test::task::spawn(ViewerStream::new(client, feed));
        let upstream = relay.open_upstream("127.0.0.1:1".parse().unwrap()).await.unwrap();

        // Second segment finds the queue full and pauses the viewer
        upstream.send(part(b"1")).await.unwrap();
        upstream.send(part(b"2")).await.unwrap();
        let stats = relay.stats().await.unwrap();
        assert_eq!(stats.clients[0].state, ProducerState::Paused);

        assert_ready!(stream.poll_next());
        assert_pending!(stream.poll_next());

        // Drained: resume was requested, viewer comes back after the cooldown
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let stats = relay.stats().await.unwrap();
        assert_eq!(stats.clients[0].state, ProducerState::Active);
    }
}
