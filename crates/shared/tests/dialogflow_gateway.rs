use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use shared::nlu::{
    DialogflowCredentials, DialogflowCxClient, DialogflowCxConfig, NluError, NluGateway,
};
use shared::params::ParamValue;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Clone)]
struct MockReply {
    status: StatusCode,
    body: Value,
    delay_ms: u64,
}

#[derive(Debug, Clone)]
struct TestServerState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen_paths: Arc<Mutex<Vec<String>>>,
    seen_auth_headers: Arc<Mutex<Vec<String>>>,
    seen_bodies: Arc<Mutex<Vec<Value>>>,
}

impl TestServerState {
    fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_paths: Arc::new(Mutex::new(Vec::new())),
            seen_auth_headers: Arc::new(Mutex::new(Vec::new())),
            seen_bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::test]
async fn detect_intent_posts_query_and_maps_result() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::OK,
        body: json!({
            "responseId": "resp-1",
            "queryResult": {
                "text": "my name is Jane",
                "languageCode": "en-US",
                "responseMessages": [
                    { "text": { "text": ["Thanks Jane.", "Where does it hurt?"] } }
                ],
                "parameters": {
                    "patient_name": "Jane",
                    "medical_history": ["asthma", "allergies"]
                },
                "currentPage": {
                    "name": "projects/clinic/locations/us-central1/agents/agent-1/flows/f/pages/pain",
                    "displayName": "Pain Details"
                },
                "match": { "intent": { "displayName": "provide.name" } }
            }
        }),
        delay_ms: 0,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let client = DialogflowCxClient::new(config_for(url, 0)).expect("client should build");
    let result = client
        .detect_intent("session-abc", "my name is Jane")
        .await
        .expect("detect intent should succeed");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        result.response_lines,
        vec!["Thanks Jane.".to_string(), "Where does it hurt?".to_string()]
    );
    assert_eq!(result.parameters["patient_name"], ParamValue::from("Jane"));
    assert_eq!(
        result.parameters["medical_history"],
        ParamValue::List(vec![ParamValue::from("asthma"), ParamValue::from("allergies")])
    );
    assert!(!result.is_conversation_end);
    assert_eq!(result.meta.page.as_deref(), Some("Pain Details"));

    assert_eq!(
        state.seen_paths.lock().await.clone(),
        vec!["projects/clinic/locations/us-central1/agents/agent-1/sessions/session-abc:detectIntent"
            .to_string()]
    );
    assert_eq!(
        state.seen_auth_headers.lock().await.clone(),
        vec!["Bearer test-dialogflow-token".to_string()]
    );
    assert_eq!(
        state.seen_bodies.lock().await.clone(),
        vec![json!({
            "queryInput": {
                "text": { "text": "my name is Jane" },
                "languageCode": "en-US"
            }
        })]
    );
}

#[tokio::test]
async fn end_page_reply_marks_conversation_end() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::OK,
        body: json!({
            "queryResult": {
                "responseMessages": [{ "text": { "text": ["All set."] } }],
                "currentPage": { "name": "projects/p/locations/l/agents/a/flows/f/pages/end", "displayName": "End Flow" }
            }
        }),
        delay_ms: 0,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let client = DialogflowCxClient::new(config_for(url, 0)).expect("client should build");
    let result = client
        .detect_intent("s1", "that's all")
        .await
        .expect("detect intent should succeed");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(result.is_conversation_end);
    assert!(result.meta.end_flags.by_end_page);
}

#[tokio::test]
async fn retries_transient_failures_before_succeeding() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: json!({ "error": { "code": 503, "status": "UNAVAILABLE" } }),
            delay_ms: 0,
        },
        MockReply {
            status: StatusCode::OK,
            body: json!({ "queryResult": { "responseMessages": [{ "text": { "text": ["Hello"] } }] } }),
            delay_ms: 0,
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let client = DialogflowCxClient::new(config_for(url, 1)).expect("client should build");
    let result = client
        .detect_intent("s1", "hi")
        .await
        .expect("request should succeed after retry");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(result.response_lines, vec!["Hello".to_string()]);
    assert_eq!(state.seen_paths.lock().await.len(), 2);
}

#[tokio::test]
async fn timed_out_turn_is_not_sent_again() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::OK,
            body: json!({ "queryResult": { "responseMessages": [{ "text": { "text": ["Late"] } }] } }),
            delay_ms: 400,
        },
        MockReply {
            status: StatusCode::OK,
            body: json!({ "queryResult": { "responseMessages": [{ "text": { "text": ["Twice"] } }] } }),
            delay_ms: 0,
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let mut config = config_for(url, 3);
    config.timeout_ms = 100;
    let client = DialogflowCxClient::new(config).expect("client should build");
    let err = client
        .detect_intent("s1", "my knee hurts")
        .await
        .expect_err("slow reply should time out");

    // Let the delayed handler finish before counting requests.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, NluError::Timeout), "got {err:?}");
    assert_eq!(state.seen_bodies.lock().await.len(), 1);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": { "code": 500, "status": "INTERNAL" } }),
            delay_ms: 0,
        },
        MockReply {
            status: StatusCode::OK,
            body: json!({ "queryResult": {} }),
            delay_ms: 0,
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let client = DialogflowCxClient::new(config_for(url, 3)).expect("client should build");
    let err = client
        .detect_intent("s1", "hi")
        .await
        .expect_err("server error should surface");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(
        matches!(err, NluError::Unavailable(ref message) if message.contains("status=500")),
        "got {err:?}"
    );
    assert_eq!(state.seen_paths.lock().await.len(), 1);
}

#[tokio::test]
async fn does_not_retry_client_errors() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::BAD_REQUEST,
        body: json!({ "error": { "code": 400, "status": "INVALID_ARGUMENT" } }),
        delay_ms: 0,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let client = DialogflowCxClient::new(config_for(url, 3)).expect("client should build");
    let err = client
        .detect_intent("s1", "hi")
        .await
        .expect_err("bad request should fail immediately");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(
        matches!(err, NluError::Unavailable(ref message) if message.contains("status=400")),
        "expected structured upstream error, got {err:?}"
    );
    assert_eq!(state.seen_paths.lock().await.len(), 1);
}

#[tokio::test]
async fn unauthorized_reply_is_an_auth_error() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::UNAUTHORIZED,
        body: json!({ "error": { "code": 401 } }),
        delay_ms: 0,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let client = DialogflowCxClient::new(config_for(url, 2)).expect("client should build");
    let err = client
        .detect_intent("s1", "hi")
        .await
        .expect_err("unauthorized should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, NluError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn payload_without_query_result_is_invalid() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::OK,
        body: json!({ "responseId": "resp-without-result" }),
        delay_ms: 0,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let client = DialogflowCxClient::new(config_for(url, 0)).expect("client should build");
    let err = client
        .detect_intent("s1", "hi")
        .await
        .expect_err("missing query result should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, NluError::InvalidPayload(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let local_addr = listener
        .local_addr()
        .expect("listener address should resolve");
    drop(listener);

    let client = DialogflowCxClient::new(config_for(format!("http://{local_addr}"), 0))
        .expect("client should build");
    let err = client
        .detect_intent("s1", "hi")
        .await
        .expect_err("closed port should fail");

    assert!(
        matches!(err, NluError::Unavailable(_) | NluError::Timeout),
        "got {err:?}"
    );
}

fn config_for(api_base_url: String, max_retries: u32) -> DialogflowCxConfig {
    DialogflowCxConfig {
        api_base_url,
        project_id: "clinic".to_string(),
        location: "us-central1".to_string(),
        agent_id: "agent-1".to_string(),
        language_code: "en-US".to_string(),
        timeout_ms: 2000,
        max_retries,
        retry_base_backoff_ms: 0,
        credentials: DialogflowCredentials::StaticToken("test-dialogflow-token".to_string()),
    }
}

async fn spawn_test_server(
    state: TestServerState,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v3/{*resource}", post(test_detect_intent_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let local_addr = listener
        .local_addr()
        .expect("listener address should resolve");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        server.await.expect("test server should run");
    });

    (format!("http://{local_addr}"), shutdown_tx, server_task)
}

async fn test_detect_intent_handler(
    State(state): State<TestServerState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.seen_paths.lock().await.push(resource);
    state.seen_bodies.lock().await.push(payload);

    if let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    {
        state.seen_auth_headers.lock().await.push(value.to_string());
    }

    let reply = state.replies.lock().await.pop_front().unwrap_or(MockReply {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "error": { "code": "exhausted_test_replies" } }),
        delay_ms: 0,
    });

    if reply.delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(reply.delay_ms)).await;
    }

    (reply.status, Json(reply.body))
}
