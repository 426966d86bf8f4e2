use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use shared::models::ReviewUpdateRequest;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, not_found_response, store_error_response};

pub(super) async fn list_intakes(State(state): State<AppState>) -> Response {
    match state.intakes.list_intakes().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(super) async fn review_intake(
    State(state): State<AppState>,
    Path(intake_id): Path<String>,
    payload: Result<Json<ReviewUpdateRequest>, JsonRejection>,
) -> Response {
    // Ids that cannot name a stored intake are indistinguishable from unknown ones.
    let Ok(intake_id) = Uuid::parse_str(intake_id.trim()) else {
        return not_found_response("Intake not found");
    };
    let Ok(Json(request)) = payload else {
        return bad_request_response("invalid_request", "Request body must be a JSON object");
    };

    let reviewed = request.reviewed.unwrap_or(false);
    let reviewed_by = request.reviewed_by.unwrap_or_default();

    match state
        .intakes
        .set_intake_reviewed(intake_id, reviewed, &reviewed_by, Utc::now())
        .await
    {
        Ok(record) => {
            info!(intake_id = %record.id, reviewed = record.reviewed, "intake review updated");
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}
