use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use signa_core::ConnectionId;
use signa_engine::Pipeline;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-socket settings.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionOptions {
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
}

/// Drive one WebSocket until either side closes or shutdown is requested.
///
/// The socket is split into a writer task, which forwards the connection's
/// outbound channel and sends periodic pings, and a reader task, which hands
/// every inbound message to the pipeline. The connection is unregistered as
/// soon as either task ends.
pub async fn handle_ws_connection(
    socket: WebSocket,
    pipeline: Arc<Pipeline>,
    options: ConnectionOptions,
    cancel: CancellationToken,
) {
    let id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(options.max_send_queue.max(1));
    let (mut ws_tx, mut ws_rx) = socket.split();

    pipeline.connect(id.clone(), tx);

    let writer_id = id.clone();
    let writer_cancel = cancel.clone();
    let heartbeat = options.heartbeat_interval;
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    let text = String::clone(&text);
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        tracing::debug!(conn_id = %writer_id, "socket write failed");
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                        break;
                    }
                    tracing::trace!(conn_id = %writer_id, "sent ping");
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_id = id.clone();
    let reader_pipeline = Arc::clone(&pipeline);
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(error) => {
                    tracing::debug!(conn_id = %reader_id, error = %error, "socket read failed");
                    break;
                }
            };
            match msg {
                WsMessage::Text(text) => {
                    let _ = reader_pipeline.handle_text(&reader_id, text.as_str());
                }
                WsMessage::Binary(bytes) => {
                    let _ = reader_pipeline.handle_binary(&reader_id, &bytes);
                }
                WsMessage::Close(_) => break,
                // axum answers pings itself
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            }
        }
    });

    let writer_done = tokio::select! {
        _ = &mut writer => {
            reader.abort();
            true
        }
        _ = &mut reader => false,
    };

    // Unregistering drops the sender, so the writer drains what is queued and exits.
    pipeline.disconnect(&id);
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(conn_id = %id, "WebSocket client disconnected");
}
