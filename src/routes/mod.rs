pub mod health;
pub mod options;
pub mod sessions;

use axum::Router;
use axum::routing::{get, post, put};

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/options", get(options::form_options))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/sessions/{id}/form", put(sessions::update_form))
        .route("/api/sessions/{id}/prompt", get(sessions::preview_prompt))
        .route("/api/sessions/{id}/generate", post(sessions::generate))
        .route(
            "/api/sessions/{id}/report/export",
            get(sessions::export_report),
        )
        .with_state(state)
}
