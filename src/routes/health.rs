use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub session: SessionHealth,
    pub lab: LabInfo,
}

#[derive(Serialize)]
pub struct SessionHealth {
    pub phase: String,
    pub submission: u64,
    pub loading: bool,
}

#[derive(Serialize)]
pub struct LabInfo {
    pub version: String,
    pub uptime_secs: i64,
    pub initial_poll_delay_ms: u128,
    pub poll_interval_ms: u128,
    pub max_polls: u32,
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let status = state.controller.status().await;
    let timings = state.controller.timings();

    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.config.backend_kind().to_string(),
        session: SessionHealth {
            phase: status.phase.name().to_string(),
            submission: status.submission,
            loading: status.loading,
        },
        lab: LabInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            initial_poll_delay_ms: timings.initial_delay.as_millis(),
            poll_interval_ms: timings.poll_interval.as_millis(),
            max_polls: timings.max_polls,
        },
    })
}
