use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_server::http::{AppState, build_router};
use shared::chat::ChatOrchestrator;
use shared::config::{ApiConfig, load_dotenv};
use shared::nlu::{DialogflowCxClient, DialogflowCxConfig};
use shared::repos::{IntakeRepository, MemoryIntakeStore, Store};
use shared::session_params::SessionParamStore;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "api_server=debug,shared=info,axum=info";

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    init_tracing();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let dialogflow_config = match DialogflowCxConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read Dialogflow config: {err}");
            std::process::exit(1);
        }
    };

    let nlu = match DialogflowCxClient::new(dialogflow_config) {
        Ok(client) => client,
        Err(err) => {
            error!("failed to initialize Dialogflow client: {err}");
            std::process::exit(1);
        }
    };

    let intakes = connect_intake_store(&config).await;

    let sessions = SessionParamStore::new(Duration::from_secs(config.session_params_ttl_seconds));
    let pruner = sessions.spawn_pruner(Duration::from_secs(config.session_params_sweep_seconds));

    let chat = ChatOrchestrator::new(Arc::new(nlu), sessions, intakes.clone())
        .with_finalize_mode(config.intake_finalize_mode)
        .with_write_timeout(Duration::from_millis(config.intake_write_timeout_ms));

    let app = build_router(
        AppState {
            chat,
            intakes,
            expose_debug_sessions: config.expose_debug_sessions,
        },
        &config.cors_allowed_origins,
    );

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid bind address {}: {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if config.expose_debug_sessions {
        warn!("debug session listing is enabled; do not use this in production");
    }

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
    });
    if let Err(err) = server.await {
        error!("server terminated with error: {err}");
        pruner.abort();
        std::process::exit(1);
    }

    pruner.abort();
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn connect_intake_store(config: &ApiConfig) -> Arc<dyn IntakeRepository> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; intakes are kept in memory and lost on restart");
        return Arc::new(MemoryIntakeStore::new());
    };

    let store = match Store::connect(database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    Arc::new(store)
}
