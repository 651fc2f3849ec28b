//! # signa-server
//!
//! Axum HTTP/WebSocket front end for the detection pipeline.
//!
//! - `GET /ws` (and `GET /`) upgrade to the detection WebSocket
//! - `GET /health` reports connection, queue and pipeline counters
//! - Each socket gets a writer task (outbound channel plus pings) and a reader
//!   that feeds the [`Pipeline`](signa_engine::Pipeline)
//! - Graceful shutdown via `CancellationToken`

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_router, start, AppState, ServerHandle};
pub use shutdown::ShutdownCoordinator;
