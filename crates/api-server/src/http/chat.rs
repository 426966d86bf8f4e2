use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use shared::models::{ChatSendRequest, ChatSendResponse};

use super::AppState;
use super::errors::{bad_request_response, chat_error_response};

pub(super) async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatSendRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return bad_request_response("invalid_message", "Request body must be a JSON object");
    };

    let Some(Value::String(message)) = request.message else {
        return bad_request_response("invalid_message", "message must be a string");
    };
    let session_id = match request.session_id {
        None | Some(Value::Null) => None,
        Some(Value::String(session_id)) => Some(session_id),
        Some(_) => {
            return bad_request_response("invalid_session_id", "sessionId must be a string");
        }
    };

    match state
        .chat
        .handle_turn(session_id.as_deref(), &message)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatSendResponse {
                response: outcome.response_lines,
                session_id: outcome.session_id,
                saved: outcome.saved,
            }),
        )
            .into_response(),
        Err(err) => chat_error_response(err),
    }
}
