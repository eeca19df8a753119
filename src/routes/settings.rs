use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::LabError;
use crate::log_capture::{LogLevel, LogSource};
use crate::settings::{load_settings, save_settings, PersistentSettings};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct SettingsResponse {
    /// Timings the running controller uses.
    pub effective: PersistentSettings,
    /// Overrides in the settings file, picked up on the next start.
    pub saved: PersistentSettings,
    pub path: String,
}

fn effective(state: &SharedState) -> PersistentSettings {
    let timings = state.controller.timings();
    PersistentSettings {
        initial_poll_delay_ms: Some(timings.initial_delay.as_millis() as u64),
        poll_interval_ms: Some(timings.poll_interval.as_millis() as u64),
        max_poll_attempts: Some(timings.max_polls),
        request_timeout_secs: Some(state.config.request_timeout.as_secs()),
    }
}

/// GET /settings
pub async fn get_settings(State(state): State<SharedState>) -> Json<SettingsResponse> {
    let path = &state.config.settings_path;
    Json(SettingsResponse {
        effective: effective(&state),
        saved: load_settings(path),
        path: path.display().to_string(),
    })
}

/// PUT /settings: merge the given overrides into the settings file.
pub async fn update_settings(
    State(state): State<SharedState>,
    Json(update): Json<PersistentSettings>,
) -> Result<impl IntoResponse, LabError> {
    if update.max_poll_attempts == Some(0) {
        return Err(LabError::Validation(
            "max_poll_attempts must be at least 1".to_string(),
        ));
    }
    if update.request_timeout_secs == Some(0) {
        return Err(LabError::Validation(
            "request_timeout_secs must be at least 1".to_string(),
        ));
    }

    let path = &state.config.settings_path;
    let mut saved = load_settings(path);
    saved.merge(update);
    save_settings(path, &saved)
        .map_err(|e| LabError::Settings(format!("failed to write {:?}: {}", path, e)))?;

    state
        .logs
        .emit(
            LogSource::Lab,
            LogLevel::Info,
            format!("Saved settings to {:?}; they apply on the next start", path),
        )
        .await;

    Ok(Json(SettingsResponse {
        effective: effective(&state),
        saved,
        path: path.display().to_string(),
    }))
}
