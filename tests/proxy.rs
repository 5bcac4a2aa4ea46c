//! ProxyClient against a live axum control plane and a fake data-plane node.

use std::time::Duration;

use axum::extract::Json;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use meshsub_client::{Envelope, ProxyClient, ResponseKind, Transport};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn refused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr.to_string()
}

/// Serve `app` on an ephemeral port; returns the base URL.
async fn spawn_control_plane(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn control_plane_success_is_2xx() {
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
    let app = Router::new()
        .route(
            "/api/v1/subscribe",
            post(move |Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body);
                    StatusCode::OK
                }
            }),
        )
        .route(
            "/api/v1/publish",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
    let base = spawn_control_plane(app).await;

    let client = ProxyClient::new(&base, "127.0.0.1:1");

    assert!(client.subscribe("client_0a0b0c0d", "news", 0.7).await);
    let body = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("in time")
        .expect("body");
    assert_eq!(body["client_id"], "client_0a0b0c0d");
    assert_eq!(body["topic"], "news");
    assert_eq!(body["threshold"], 0.7);

    // Non-2xx collapses to false, indistinguishable from transport failure.
    assert!(!client.publish("client_0a0b0c0d", "news", "hello").await);
}

#[tokio::test]
async fn control_plane_unreachable_is_false() {
    let base = format!("http://{}", refused_addr().await);
    let client = ProxyClient::new(&base, "127.0.0.1:1");
    assert!(!client.subscribe("client_0a0b0c0d", "news", 0.5).await);
    assert!(!client.publish("client_0a0b0c0d", "news", "hello").await);
}

#[tokio::test]
async fn data_plane_correlates_and_delivers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let stream_addr = listener.local_addr().expect("local addr").to_string();

    let (hello_tx, mut hello_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let transport = Transport::stream(socket);
        let hello = transport.recv_envelope().await.expect("first frame");
        let _ = hello_tx.send(hello);
        transport
            .send_envelope(Envelope::response(
                ResponseKind::Message,
                "news",
                Bytes::from_static(b"plain text payload"),
            ))
            .await
            .expect("node send");
        // Keep the connection open until the client is done.
        let _ = transport.recv_envelope().await;
    });

    let client = ProxyClient::new("http://127.0.0.1:1", &stream_addr);
    let client_id = ProxyClient::generate_client_id();

    assert!(client.connect_stream(&client_id).await);

    let hello = timeout(Duration::from_secs(2), hello_rx.recv())
        .await
        .expect("in time")
        .expect("hello frame");
    assert_eq!(&hello.data[..], client_id.as_bytes());

    let (topic, text) = client
        .receive_message(Duration::from_secs(2))
        .await
        .expect("message");
    assert_eq!(topic, "news");
    assert_eq!(text, "plain text payload");

    // No further traffic: the read times out without side effects.
    assert!(client.receive_message(Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn data_plane_timeout_leaves_later_frames_deliverable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let stream_addr = listener.local_addr().expect("local addr").to_string();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let transport = Transport::stream(socket);
        let _ = transport.recv_envelope().await.expect("hello frame");
        // Stay silent past the client's first read timeout, then deliver.
        tokio::time::sleep(Duration::from_millis(300)).await;
        transport
            .send_envelope(Envelope::response(
                ResponseKind::Message,
                "news",
                Bytes::from_static(b"late but valid"),
            ))
            .await
            .expect("node send");
        let _ = transport.recv_envelope().await;
    });

    let client = ProxyClient::new("http://127.0.0.1:1", &stream_addr);
    assert!(client.connect_stream("client_0a0b0c0d").await);

    // A timed-out read has no effect on the stream.
    assert!(client.receive_message(Duration::from_millis(100)).await.is_none());

    let (topic, text) = client
        .receive_message(Duration::from_secs(2))
        .await
        .expect("frame after the timeout");
    assert_eq!(topic, "news");
    assert_eq!(text, "late but valid");
}

#[tokio::test]
async fn data_plane_connect_failure_is_false() {
    let client = ProxyClient::new("http://127.0.0.1:1", refused_addr().await);
    assert!(!client.connect_stream("client_0a0b0c0d").await);
    assert!(client.receive_message(Duration::from_millis(50)).await.is_none());
}
