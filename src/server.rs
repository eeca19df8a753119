use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Lifecycle intents
        .route("/analyze", post(crate::routes::analysis::analyze))
        .route("/trend", post(crate::routes::analysis::trend))
        // Session state
        .route("/session", get(crate::routes::analysis::session))
        .route(
            "/session/stream",
            get(crate::routes::analysis::session_stream),
        )
        .route("/rating", get(crate::routes::analysis::rating))
        // Settings
        .route(
            "/settings",
            get(crate::routes::settings::get_settings)
                .put(crate::routes::settings::update_settings),
        )
        // Activity log
        .route("/logs/history", get(crate::routes::logs::log_history))
        .route("/logs/stream", get(crate::routes::logs::log_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
