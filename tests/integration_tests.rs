//! Integration tests for the relay
//!
//! These drive the public router with `oneshot` against a scripted upstream, checking the
//! streaming pipe end to end: byte fidelity, incremental delivery and cancellation.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use azure_relay::client::{ClientError, HttpClient};
use azure_relay::deployments::DeploymentMap;
use azure_relay::upstream::{ApiKey, UpstreamConfig};
use azure_relay::{AppState, build_router};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tower::util::ServiceExt; // for oneshot()

/// Upstream whose streaming body is fed by the test through a channel.
#[derive(Clone)]
struct ChannelUpstream {
    receiver: Arc<Mutex<Option<mpsc::Receiver<Bytes>>>>,
}

impl std::fmt::Debug for ChannelUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelUpstream").finish()
    }
}

impl ChannelUpstream {
    fn new() -> (Self, mpsc::Sender<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                receiver: Arc::new(Mutex::new(Some(rx))),
            },
            tx,
        )
    }
}

#[async_trait]
impl HttpClient for ChannelUpstream {
    async fn request(&self, _req: axum::extract::Request) -> Result<Response, ClientError> {
        let rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("upstream called more than once");
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
        });
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(Body::from_stream(stream))
            .unwrap())
    }
}

fn app(upstream: ChannelUpstream) -> axum::Router {
    let config = UpstreamConfig::builder()
        .endpoint("https://example.openai.azure.com".parse().unwrap())
        .api_key(ApiKey::new("test-key"))
        .build();
    build_router(AppState::with_client(
        DeploymentMap::builtin(),
        config,
        upstream,
    ))
}

fn streaming_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello"}],
                "stream": true
            }))
            .unwrap(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_stream_bytes_are_forwarded_unchanged() {
    let (upstream, tx) = ChannelUpstream::new();
    let response = app(upstream).oneshot(streaming_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    // Chunk boundaries deliberately split events and a multi-byte character.
    let sent: Vec<&[u8]> = vec![
        b"data: {\"choices\":[{\"delta\":{\"content\":\"caf",
        b"\xc3",
        b"\xa9\"}}]}\n",
        b"\ndata: [DONE]\n\n",
    ];
    for chunk in &sent {
        tx.send(Bytes::copy_from_slice(chunk)).await.unwrap();
    }
    drop(tx);

    let received = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(received.as_ref(), sent.concat().as_slice());
}

#[tokio::test]
async fn test_stream_chunks_arrive_before_upstream_finishes() {
    let (upstream, tx) = ChannelUpstream::new();
    let response = app(upstream).oneshot(streaming_request()).await.unwrap();
    let mut body = response.into_body().into_data_stream();

    tx.send(Bytes::from_static(b"data: first\n\n")).await.unwrap();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), b"data: first\n\n");

    tx.send(Bytes::from_static(b"data: second\n\n")).await.unwrap();
    let second = body.next().await.unwrap().unwrap();
    assert_eq!(second.as_ref(), b"data: second\n\n");

    drop(tx);
    assert!(body.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_client_body_releases_upstream() {
    let (upstream, tx) = ChannelUpstream::new();
    let response = app(upstream).oneshot(streaming_request()).await.unwrap();

    tx.send(Bytes::from_static(b"data: first\n\n")).await.unwrap();
    drop(response);

    // The upstream receiver went away with the response body.
    tx.closed().await;
    assert!(tx.send(Bytes::from_static(b"data: late\n\n")).await.is_err());
}
