//! Read-only status endpoint
//!
//! Serves liveness, Prometheus metrics and JSON views of the pending
//! verifications and known groups.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use joinguard_gate::{GroupRegistry, VerificationGate};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct StatusState {
    pub gate: Arc<VerificationGate>,
    pub groups: Arc<GroupRegistry>,
    pub registry: prometheus::Registry,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy"})) }))
        .route("/metrics", get(metrics))
        .route("/api/v1/pending", get(pending))
        .route("/api/v1/groups", get(groups))
        .route(
            "/api/v1/version",
            get(|| async {
                Json(serde_json::json!({
                    "service": "joinguard",
                    "version": joinguard_common::VERSION,
                }))
            }),
        )
        .with_state(state)
}

async fn metrics(State(state): State<StatusState>) -> Response {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&state.registry.gather(), &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buffer,
    )
        .into_response()
}

async fn pending(State(state): State<StatusState>) -> Json<serde_json::Value> {
    let pending = state.gate.pending();
    Json(serde_json::json!({
        "total": pending.len(),
        "pending": pending,
    }))
}

async fn groups(State(state): State<StatusState>) -> Json<serde_json::Value> {
    let groups = state.groups.list();
    Json(serde_json::json!({
        "total": groups.len(),
        "groups": groups,
    }))
}
