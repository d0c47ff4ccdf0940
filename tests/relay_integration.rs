//! End-to-end tests: a camera source over TCP, viewers over the HTTP router.

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tower::ServiceExt;

use mjpeg_relay::relay::{Relay, RelayConfig, RelayHandle};
use mjpeg_relay::server::{router, ServerConfig, UpstreamListener};

const SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

fn part(payload: &[u8]) -> Vec<u8> {
    [SOI, payload, &b"--spionisto\r\n"[..]].concat()
}

async fn start() -> (RelayHandle, TcpStream) {
    let config = ServerConfig::default().upstream("127.0.0.1:0".parse().unwrap());
    let (relay, handle) = Relay::new(RelayConfig::default());
    tokio::spawn(relay.run());

    let listener = UpstreamListener::bind(&config, handle.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());

    let camera = TcpStream::connect(addr).await.unwrap();
    (handle, camera)
}

async fn wait_for_sequence(relay: &RelayHandle, sequence: u64) {
    for _ in 0..200 {
        if relay.latest_frame().map(|f| f.sequence) >= Some(sequence) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("frame {} never arrived", sequence);
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ping() {
    let (relay, _camera) = start().await;
    let app = router(relay, Path::new("web"));

    let response = app.oneshot(get("/ping")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ready");
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_config_endpoints() {
    let (relay, _camera) = start().await;
    let app = router(relay, Path::new("web"));

    let response = app.clone().oneshot(get("/getConfig")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({}));

    let response = app
        .oneshot(get("/updateConfig?threshold=12"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "done");
}

#[tokio::test]
async fn test_latest_frame_before_and_after_first_image() {
    let (relay, mut camera) = start().await;
    let app = router(relay.clone(), Path::new("web"));

    let response = app.clone().oneshot(get("/latest.jpeg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    camera.write_all(b"Content-Type: image/jpeg\r\n\r\n").await.unwrap();
    camera.write_all(&part(b"IMG1DATA")).await.unwrap();
    wait_for_sequence(&relay, 1).await;

    let response = app.oneshot(get("/latest.jpeg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], &[SOI, &b"IMG1DATA"[..]].concat()[..]);
}

#[tokio::test]
async fn test_stream_relays_raw_parts() {
    let (relay, mut camera) = start().await;
    let app = router(relay.clone(), Path::new("web"));

    let response = app.oneshot(get("/stream.mjpeg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=spionisto"
    );
    let mut body = response.into_body().into_data_stream();

    let stream = [part(b"ONE"), part(b"TWO"), b"\xFF\xD8\xFFincomplete".to_vec()].concat();
    for chunk in stream.chunks(7) {
        camera.write_all(chunk).await.unwrap();
    }

    let expected = [part(b"ONE"), part(b"TWO")].concat();
    let mut received = Vec::new();
    while received.len() < expected.len() {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("viewer stalled")
            .unwrap()
            .unwrap();
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_closing_viewer_unsubscribes() {
    let (relay, _camera) = start().await;
    let app = router(relay.clone(), Path::new("web"));

    let response = app.oneshot(get("/stream.mjpeg")).await.unwrap();
    assert_eq!(relay.stats().await.unwrap().viewer_count(), 1);

    drop(response);
    assert_eq!(relay.stats().await.unwrap().viewer_count(), 0);
}

#[tokio::test]
async fn test_camera_disconnect_keeps_last_frame() {
    let (relay, mut camera) = start().await;

    camera.write_all(&part(b"last")).await.unwrap();
    wait_for_sequence(&relay, 1).await;
    drop(camera);

    for _ in 0..200 {
        if !relay.stats().await.unwrap().upstream_connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = relay.stats().await.unwrap();
    assert!(!stats.upstream_connected);
    assert_eq!(
        relay.latest_frame().unwrap().data,
        [SOI, &b"last"[..]].concat()
    );
}
