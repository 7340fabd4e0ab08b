//! HTTP Status Module
//!
//! Read-only views of the controller over HTTP:
//!
//! - `GET /engines`: every registered engine with its heart state and load.
//! - `GET /queue_status`: outstanding request count per engine.
//!
//! Handlers never touch controller state. They post an `Inbound::Query` to the
//! event loop and wait for its answer.

pub mod handlers;


use axum::{Extension, Router, routing::get};
use std::net::SocketAddr;

use crate::controller::protocol::InboundSender;
use handlers::{handle_get_engines, handle_get_queue_status};

pub fn router(inbound: InboundSender) -> Router {
    Router::new()
        .route("/engines", get(handle_get_engines))
        .route("/queue_status", get(handle_get_queue_status))
        .layer(Extension(inbound))
}

/// Serves the status routes until the listener fails.
pub async fn serve(addr: SocketAddr, inbound: InboundSender) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP status server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(inbound)).await?;
    Ok(())
}
