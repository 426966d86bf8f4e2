use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use shared::models::{OkResponse, PingResponse};
use tracing::warn;

use super::AppState;
use super::errors::service_unavailable_response;

pub(super) async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PingResponse {
            ok: true,
            ts: Utc::now().timestamp_millis(),
        }),
    )
}

pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    match state.intakes.ping().await {
        Ok(_) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(err) => {
            warn!("readiness check failed: {err}");
            service_unavailable_response("db_unavailable", "Database not ready")
        }
    }
}
