use axum::{Extension, Json, http::StatusCode};
use std::collections::BTreeMap;
use tokio::sync::oneshot;

use crate::controller::protocol::{
    EngineSummary, Inbound, InboundSender, Query, QueryReply, QueueStatusEntry,
};
use crate::registry::types::EngineId;

async fn ask(inbound: &InboundSender, query: Query) -> Option<QueryReply> {
    let (tx, rx) = oneshot::channel();

    if inbound.send(Inbound::Query(query, tx)).is_err() {
        tracing::error!("Event loop is gone, cannot answer {:?}", query);
        return None;
    }

    rx.await.ok()
}

pub async fn handle_get_engines(
    Extension(inbound): Extension<InboundSender>,
) -> (StatusCode, Json<Vec<EngineSummary>>) {
    match ask(&inbound, Query::Engines).await {
        Some(QueryReply::Engines(engines)) => (StatusCode::OK, Json(engines)),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(Vec::new())),
    }
}

pub async fn handle_get_queue_status(
    Extension(inbound): Extension<InboundSender>,
) -> (StatusCode, Json<BTreeMap<EngineId, QueueStatusEntry>>) {
    match ask(&inbound, Query::QueueStatus).await {
        Some(QueryReply::QueueStatus(status)) => (StatusCode::OK, Json(status)),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(BTreeMap::new())),
    }
}
