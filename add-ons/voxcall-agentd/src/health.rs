//! Kubernetes-style health probe surface.
//!
//! Three boolean probes plus a JSON state report. The probes answer from
//! [`ReadinessSignal`] atomics, so they stay responsive no matter what the
//! call task is doing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use voxcall_core::ReadinessSignal;

pub fn build_router(readiness: ReadinessSignal) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/health/startup", get(startup))
        .route("/health/state", get(state))
        .with_state(readiness)
}

fn probe(up: bool, label: &str) -> (StatusCode, Json<serde_json::Value>) {
    let status = if up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ label: up })))
}

async fn live(State(readiness): State<ReadinessSignal>) -> (StatusCode, Json<serde_json::Value>) {
    probe(readiness.is_alive(), "alive")
}

async fn ready(State(readiness): State<ReadinessSignal>) -> (StatusCode, Json<serde_json::Value>) {
    probe(readiness.is_ready(), "ready")
}

async fn startup(
    State(readiness): State<ReadinessSignal>,
) -> (StatusCode, Json<serde_json::Value>) {
    probe(readiness.is_startup_complete(), "startup_complete")
}

/// Full counters view; always 200, the body carries the verdicts.
async fn state(State(readiness): State<ReadinessSignal>) -> Json<voxcall_core::HealthSnapshot> {
    Json(readiness.snapshot())
}
