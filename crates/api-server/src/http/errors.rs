use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::chat::ChatError;
use shared::models::{ErrorBody, ErrorResponse};
use shared::repos::StoreError;
use tracing::error;

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn not_found_response(message: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", message)
}

pub(super) fn internal_error_response() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Unexpected server error",
    )
}

pub(super) fn service_unavailable_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, code, message)
}

pub(super) fn chat_error_response(err: ChatError) -> Response {
    match err {
        ChatError::Validation(message) => bad_request_response("invalid_message", &message),
        ChatError::InvalidSessionId(message) => {
            bad_request_response("invalid_session_id", &message)
        }
        ChatError::Upstream(err) => {
            error!("chatbot upstream call failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "chatbot_unavailable",
                "Chatbot error",
            )
        }
        ChatError::Persistence(err) => store_error_response(err),
    }
}

pub(super) fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => not_found_response("Intake not found"),
        other => {
            error!("database operation failed: {other}");
            internal_error_response()
        }
    }
}
