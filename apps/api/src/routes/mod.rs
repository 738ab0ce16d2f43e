pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::profile::handlers as profile;
use crate::profile::ingest::MAX_UPLOAD_BYTES;
use crate::search::handlers as search;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profiles
        .route("/api/v1/profiles", post(profile::handle_upload_profile))
        .route("/api/v1/profiles/:id", get(profile::handle_get_profile))
        // Search runs
        .route("/api/v1/search", post(search::handle_start_search))
        .route("/api/v1/search/history", get(search::handle_search_history))
        .route("/api/v1/search/:run_id", get(search::handle_search_status))
        .route(
            "/api/v1/search/:run_id/events",
            get(search::handle_search_events),
        )
        .route(
            "/api/v1/search/:run_id/cancel",
            post(search::handle_cancel_search),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + UPLOAD_OVERHEAD_BYTES))
        .with_state(state)
}
