use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use shared::models::EchoResponse;
use shared::params::ParamMap;
use tracing::debug;

use super::AppState;
use super::errors::not_found_response;

pub(super) async fn echo(body: Result<Json<Value>, JsonRejection>) -> impl IntoResponse {
    let you_sent = body.map(|Json(value)| value).unwrap_or(Value::Null);
    debug!(is_object = you_sent.is_object(), "echo request received");
    (StatusCode::OK, Json(EchoResponse { ok: true, you_sent }))
}

pub(super) async fn list_sessions(State(state): State<AppState>) -> Response {
    if !state.expose_debug_sessions {
        return not_found_response("Not found");
    }

    let sessions: BTreeMap<String, ParamMap> = state.chat.sessions().snapshot_all();
    (StatusCode::OK, Json(sessions)).into_response()
}
