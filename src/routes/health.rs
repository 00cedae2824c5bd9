use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "isLeader": state.config().worker.is_leader,
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// Probes both the export store and the host reservation database.
pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let store_healthy = state.store().get_export_settings().is_ok();
    let store_latency_us = start.elapsed().as_micros() as u64;

    let start = Instant::now();
    let host_healthy = match state.host_db().ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Host database ping failed");
            false
        }
    };
    let host_latency_us = start.elapsed().as_micros() as u64;

    let healthy = store_healthy && host_healthy;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "healthy": healthy,
            "store": { "healthy": store_healthy, "latencyUs": store_latency_us },
            "hostDatabase": { "healthy": host_healthy, "latencyUs": host_latency_us },
        })),
    )
}
