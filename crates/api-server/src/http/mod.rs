use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, patch, post};
use axum::{Router, middleware};
use shared::chat::ChatOrchestrator;
use shared::repos::IntakeRepository;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

mod chat;
mod debug;
mod errors;
mod health;
mod intakes;
mod observability;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatOrchestrator,
    pub intakes: Arc<dyn IntakeRepository>,
    /// Serves `/api/debug/sessions` when set. Off outside local development.
    pub expose_debug_sessions: bool,
}

pub fn build_router(app_state: AppState, cors_allowed_origins: &[String]) -> Router {
    let api_routes = Router::new()
        .route("/ping", get(health::ping))
        .route("/echo", post(debug::echo))
        .route("/chatbot/send", post(chat::send_message))
        .route("/intakes", get(intakes::list_intakes))
        .route("/intakes/{intake_id}/review", patch(intakes::review_intake))
        .route("/debug/sessions", get(debug::list_sessions));

    Router::new()
        .route("/ping", get(health::ping))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(cors_layer(cors_allowed_origins))
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .with_state(app_state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}
