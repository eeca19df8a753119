use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use crate::error::LabError;
use crate::lifecycle::TrendOutcome;
use crate::log_capture::{LogLevel, LogSource};
use crate::report::{Metric, Rating};
use crate::state::SharedState;
use crate::submission::TargetUrl;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

/// POST /analyze: validate the URL and start a new submission.
pub async fn analyze(
    State(state): State<SharedState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, LabError> {
    let target = match TargetUrl::parse(&req.url) {
        Ok(target) => target,
        Err(e) => {
            state
                .logs
                .emit(LogSource::Lab, LogLevel::Warn, format!("Rejected input: {}", e))
                .await;
            return Err(e.into());
        }
    };

    let submission = state.controller.analyze(target.clone()).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "started",
            "submission": submission,
            "url": target.as_str(),
        })),
    ))
}

/// POST /trend: load trend data for the completed submission.
pub async fn trend(State(state): State<SharedState>) -> Result<impl IntoResponse, LabError> {
    let body = match state.controller.view_trend().await? {
        TrendOutcome::Fetched(points) => serde_json::json!({
            "status": "fetched",
            "trend": points,
        }),
        TrendOutcome::Cached(points) => serde_json::json!({
            "status": "cached",
            "trend": points,
        }),
        TrendOutcome::InFlight => serde_json::json!({
            "status": "in_flight",
            "trend": null,
        }),
    };
    Ok(Json(body))
}

/// GET /session
pub async fn session(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// GET /session/stream: SSE stream of session snapshots, starting with the current one.
pub async fn session_stream(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.controller.subscribe()).map(|status| {
        let data = serde_json::to_string(&status).unwrap_or_default();
        Ok(Event::default().event("status").data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct RatingQuery {
    pub metric: String,
    pub score: f64,
}

/// GET /rating?metric=lcp&score=2.1
pub async fn rating(Query(query): Query<RatingQuery>) -> Result<impl IntoResponse, LabError> {
    let metric: Metric = query.metric.parse().map_err(LabError::Validation)?;
    if !query.score.is_finite() || query.score < 0.0 {
        return Err(LabError::Validation(format!(
            "score must be a non-negative number, got {}",
            query.score
        )));
    }
    let rating = Rating::for_metric(metric, query.score);

    Ok(Json(serde_json::json!({
        "metric": metric,
        "score": query.score,
        "rating": rating,
    })))
}
