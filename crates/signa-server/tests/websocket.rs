//! End-to-end tests against a real listener on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use signa_core::{MockOracle, MockReply};
use signa_engine::{Pipeline, PipelineConfig};
use signa_server::{start, ServerConfig, ServerHandle};
use signa_telemetry::PipelineMetrics;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    handle: ServerHandle,
    pipeline: Arc<Pipeline>,
    oracle: Arc<MockOracle>,
    cancel: CancellationToken,
}

impl TestServer {
    async fn start(oracle: MockOracle) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let pipeline = Arc::new(Pipeline::new(
            PipelineConfig::default(),
            Arc::new(PipelineMetrics::new()),
        ));
        let oracle = Arc::new(oracle);
        let cancel = CancellationToken::new();
        let handle = start(config, pipeline.clone(), oracle.clone(), cancel.clone())
            .await
            .unwrap();
        Self {
            handle,
            pipeline,
            oracle,
            cancel,
        }
    }

    async fn connect(&self, path: &str) -> Client {
        let url = format!("ws://127.0.0.1:{}{}", self.handle.port, path);
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    async fn health(&self) -> Value {
        let url = format!("http://127.0.0.1:{}/health", self.handle.port);
        reqwest::get(url).await.unwrap().json().await.unwrap()
    }

    async fn wait_until(&self, what: &str, check: impl Fn(&Pipeline) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(&self.pipeline) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    async fn stop(self) {
        self.cancel.cancel();
        for task in self.handle.into_handles() {
            let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
        }
    }
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv(client: &mut Client) -> Value {
    let next = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(text.as_str()).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("unexpected websocket event: {other:?}"),
            }
        }
    });
    next.await.expect("timed out waiting for a server message")
}

/// Fails if any text message arrives within `window`.
async fn expect_silence(client: &mut Client, window: Duration) {
    let result = tokio::time::timeout(window, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("expected no message, got {text}");
    }
}

fn frame(frame_id: u64) -> Value {
    let data = base64::engine::general_purpose::STANDARD.encode(format!("frame {frame_id}"));
    json!({"type": "frame", "data": format!("data:image/jpeg;base64,{data}"), "frameId": frame_id})
}

fn start_detection() -> Value {
    json!({"type": "command", "action": "start_detection"})
}

fn stop_detection() -> Value {
    json!({"type": "command", "action": "stop_detection"})
}

#[tokio::test]
async fn greets_once_on_connect() {
    let server = TestServer::start(MockOracle::echo()).await;
    let mut client = server.connect("/ws").await;

    let welcome = recv(&mut client).await;
    assert_eq!(
        welcome,
        json!({"type": "connection", "message": "Connected to sign language detection server"})
    );
    expect_silence(&mut client, Duration::from_millis(100)).await;
    server.stop().await;
}

#[tokio::test]
async fn root_path_also_upgrades() {
    let server = TestServer::start(MockOracle::echo()).await;
    let mut client = server.connect("/").await;
    assert_eq!(recv(&mut client).await["type"], "connection");
    server.stop().await;
}

#[tokio::test]
async fn start_then_frames_in_order() {
    let server = TestServer::start(MockOracle::new(vec![
        MockReply::text("Hello"),
        MockReply::text("Thank you"),
        MockReply::text("Yes"),
    ]))
    .await;
    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;

    send(&mut client, start_detection()).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "status", "status": "detection_started"})
    );

    for n in 0..3 {
        send(&mut client, frame(n)).await;
    }
    let mut got = Vec::new();
    for _ in 0..3 {
        let msg = recv(&mut client).await;
        assert_eq!(msg["type"], "detection");
        got.push((msg["frameId"].as_u64().unwrap(), msg["text"].as_str().unwrap().to_string()));
    }
    assert_eq!(
        got,
        vec![
            (0, "Hello".to_string()),
            (1, "Thank you".to_string()),
            (2, "Yes".to_string()),
        ]
    );
    assert_eq!(server.oracle.frames()[0], b"frame 0".to_vec());
    server.stop().await;
}

#[tokio::test]
async fn frames_before_start_are_ignored() {
    let server = TestServer::start(MockOracle::echo()).await;
    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;

    send(&mut client, frame(0)).await;
    server
        .wait_until("frame to be seen", |p| p.metrics().snapshot().frames_received == 1)
        .await;
    expect_silence(&mut client, Duration::from_millis(100)).await;
    assert_eq!(server.oracle.call_count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn stop_right_after_frame_suppresses_detection() {
    let gate = Arc::new(Notify::new());
    let server = TestServer::start(MockOracle::new(vec![MockReply::gated(
        gate.clone(),
        MockReply::text("blocker"),
    )]))
    .await;

    // A second connection occupies the oracle so frame 5 stays queued.
    let mut busy = server.connect("/ws").await;
    let _ = recv(&mut busy).await;
    send(&mut busy, start_detection()).await;
    let _ = recv(&mut busy).await;
    send(&mut busy, frame(100)).await;
    let oracle = server.oracle.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while oracle.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;
    send(&mut client, start_detection()).await;
    let _ = recv(&mut client).await;
    send(&mut client, frame(5)).await;
    send(&mut client, stop_detection()).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "status", "status": "detection_stopped"})
    );

    gate.notify_one();
    assert_eq!(recv(&mut busy).await["frameId"], 100);
    expect_silence(&mut client, Duration::from_millis(200)).await;
    assert_eq!(server.oracle.call_count(), 1);
    server.stop().await;
}

#[tokio::test]
async fn close_during_recognition_is_harmless() {
    let gate = Arc::new(Notify::new());
    let server = TestServer::start(MockOracle::new(vec![MockReply::gated(
        gate.clone(),
        MockReply::text("Hello"),
    )]))
    .await;

    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;
    send(&mut client, start_detection()).await;
    let _ = recv(&mut client).await;
    send(&mut client, frame(0)).await;

    let oracle = server.oracle.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while oracle.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    client.close(None).await.unwrap();
    drop(client);
    server.wait_until("disconnect", |p| p.stats().connections == 0).await;

    gate.notify_one();
    server
        .wait_until("stale detection", |p| p.metrics().snapshot().detections_stale == 1)
        .await;

    // The worker is still serving other connections.
    let mut next = server.connect("/ws").await;
    let _ = recv(&mut next).await;
    send(&mut next, start_detection()).await;
    let _ = recv(&mut next).await;
    send(&mut next, frame(1)).await;
    let detection = recv(&mut next).await;
    assert_eq!(detection["frameId"], 1);
    server.stop().await;
}

#[tokio::test]
async fn malformed_and_unknown_messages_keep_connection_open() {
    let server = TestServer::start(MockOracle::echo()).await;
    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;

    client.send(Message::text("not json")).await.unwrap();
    send(&mut client, json!({"type": "command", "action": "rewind"})).await;
    send(&mut client, json!({"type": "telemetry"})).await;
    send(&mut client, json!({"type": "frame", "data": "", "frameId": 1})).await;

    send(&mut client, start_detection()).await;
    assert_eq!(recv(&mut client).await["status"], "detection_started");
    let counters = server.pipeline.metrics().snapshot();
    assert_eq!(counters.malformed_messages, 1);
    assert_eq!(counters.frames_rejected_inactive, 1);
    server.stop().await;
}

#[tokio::test]
async fn health_reports_connections() {
    let server = TestServer::start(MockOracle::echo()).await;
    let mut client = server.connect("/ws").await;
    let _ = recv(&mut client).await;
    send(&mut client, start_detection()).await;
    let _ = recv(&mut client).await;

    let body = server.health().await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["active_connections"], 1);
    assert_eq!(body["queue_depth"], 0);
    assert!(body["counters"]["oracle_latency_ms"].is_object());
    server.stop().await;
}
