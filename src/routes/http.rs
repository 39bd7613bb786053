// GET handlers: metrics, version, fallback

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;

use super::AppState;
use crate::aggregator::error_snapshot;
use crate::exposition::{self, CONTENT_TYPE};
use crate::version::{NAME, VERSION};

/// GET metrics path and /: a fresh snapshot per request, always 200.
///
/// Collection runs on its own task so a panic inside it still yields an error
/// snapshot instead of a dropped connection.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    let body = match tokio::spawn(async move { aggregator.collect(Utc::now()).await }).await {
        Ok(result) => result.render(),
        Err(e) => {
            tracing::error!(error = %e, "metrics collection task failed");
            let project = &state.aggregator.settings().project_id;
            exposition::render(&error_snapshot(
                project,
                &format!("generating metrics: {}", e),
            ))
        }
    };
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

pub(super) async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
