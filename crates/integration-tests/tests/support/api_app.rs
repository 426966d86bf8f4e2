#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use api_server::http::{AppState, build_router};
use shared::chat::ChatOrchestrator;
use shared::nlu::{DialogflowCredentials, DialogflowCxClient, DialogflowCxConfig};
use shared::repos::IntakeRepository;
use shared::session_params::SessionParamStore;

pub const TEST_ORIGIN: &str = "http://localhost:3000";

pub fn build_test_router(
    intakes: Arc<dyn IntakeRepository>,
    dialogflow_base_url: &str,
    expose_debug_sessions: bool,
) -> axum::Router {
    let nlu = DialogflowCxClient::new(DialogflowCxConfig {
        api_base_url: dialogflow_base_url.to_string(),
        project_id: "clinic".to_string(),
        location: "global".to_string(),
        agent_id: "intake-agent".to_string(),
        language_code: "en-US".to_string(),
        timeout_ms: 2000,
        max_retries: 0,
        retry_base_backoff_ms: 0,
        credentials: DialogflowCredentials::StaticToken("integration-test-token".to_string()),
    })
    .expect("dialogflow client should initialize");

    let chat = ChatOrchestrator::new(
        Arc::new(nlu),
        SessionParamStore::new(Duration::from_secs(3600)),
        intakes.clone(),
    )
    .with_write_timeout(Duration::from_secs(5));

    build_router(
        AppState {
            chat,
            intakes,
            expose_debug_sessions,
        },
        &[TEST_ORIGIN.to_string()],
    )
}
