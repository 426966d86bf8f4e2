#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct MockState {
    replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
    seen_sessions: Arc<Mutex<Vec<String>>>,
}

/// Stand-in for the Dialogflow CX `detectIntent` endpoint that plays back
/// scripted replies in order.
pub struct MockDialogflowServer {
    pub base_url: String,
    state: MockState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockDialogflowServer {
    pub async fn start(replies: Vec<(StatusCode, Value)>) -> Self {
        let state = MockState {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_sessions: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v3/{*resource}", post(detect_intent))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock dialogflow listener should bind");
        let bind_addr = listener
            .local_addr()
            .expect("mock dialogflow listener local address should exist");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock dialogflow server should run");
        });

        Self {
            base_url: format!("http://{bind_addr}"),
            state,
            handle,
        }
    }

    /// Session ids in call order, taken from the request path.
    pub async fn seen_sessions(&self) -> Vec<String> {
        self.state.seen_sessions.lock().await.clone()
    }
}

impl Drop for MockDialogflowServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn detect_intent(
    State(state): State<MockState>,
    Path(resource): Path<String>,
) -> (StatusCode, Json<Value>) {
    let session = resource
        .rsplit('/')
        .next()
        .and_then(|segment| segment.strip_suffix(":detectIntent"))
        .unwrap_or_default()
        .to_string();
    state.seen_sessions.lock().await.push(session);

    let reply = state.replies.lock().await.pop_front();
    match reply {
        Some((status, body)) => (status, Json(body)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": 500, "message": "no scripted reply" } })),
        ),
    }
}

pub fn ok_reply(lines: &[&str], parameters: Value, page_display_name: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "queryResult": {
                "responseMessages": [{ "text": { "text": lines } }],
                "parameters": parameters,
                "currentPage": {
                    "name": format!("projects/clinic/locations/global/agents/a/flows/f/pages/{}", page_display_name.to_ascii_lowercase().replace(' ', "-")),
                    "displayName": page_display_name
                }
            }
        }),
    )
}

pub fn end_reply(lines: &[&str], parameters: Value) -> (StatusCode, Value) {
    ok_reply(lines, parameters, "End Flow")
}

pub fn failure_reply() -> (StatusCode, Value) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": { "code": 503, "status": "UNAVAILABLE" } }),
    )
}
