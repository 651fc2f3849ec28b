use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use signa_core::RecognitionOracle;
use signa_engine::{DispatchLoop, Pipeline};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionOptions};
use crate::error::ServerError;
use crate::health;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub options: ConnectionOptions,
    pub max_message_size: usize,
    pub started_at: Instant,
    pub cancel: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener, then spawn the HTTP server and the dispatch loop.
///
/// Both tasks stop when `cancel` fires.
pub async fn start(
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
    oracle: Arc<dyn RecognitionOracle>,
    cancel: CancellationToken,
) -> Result<ServerHandle, ServerError> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        options: ConnectionOptions {
            max_send_queue: config.max_send_queue,
            heartbeat_interval: config.heartbeat_interval,
        },
        max_message_size: config.max_message_size,
        started_at: Instant::now(),
        cancel: cancel.clone(),
    };

    let dispatch = DispatchLoop::new(Arc::clone(&pipeline), oracle).spawn(cancel.clone());

    let router = build_router(state);
    let serve_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
            .await;
        if let Err(error) = result {
            tracing::error!(error = %error, "server error");
        }
    });

    tracing::info!(
        port = local_addr.port(),
        queue_capacity = pipeline.config().queue_capacity,
        overflow_policy = pipeline.config().overflow_policy.as_str(),
        "signa server started"
    );

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
        dispatch,
    })
}

/// Handle returned by `start()`; owns the background tasks.
pub struct ServerHandle {
    pub port: u16,
    server: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl ServerHandle {
    /// Task handles to await during shutdown.
    pub fn into_handles(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.dispatch]
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("WebSocket client connected");
    connection::handle_ws_connection(socket, state.pipeline, state.options, state.cancel).await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health::health_check(
        state.started_at,
        state.pipeline.stats(),
        state.pipeline.metrics().snapshot(),
    ))
}
