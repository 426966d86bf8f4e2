use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::chat::FinalizeMode;
use crate::config_env::{
    optional_trimmed_env, parse_bool_env, parse_list_env, parse_u32_env, parse_u64_env,
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CORS_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000"];

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub session_params_ttl_seconds: u64,
    pub session_params_sweep_seconds: u64,
    pub intake_finalize_mode: FinalizeMode,
    pub intake_write_timeout_ms: u64,
    pub cors_allowed_origins: Vec<String>,
    pub expose_debug_sessions: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("failed to load .env file: {0}")]
    DotEnv(String),
}

/// Loads `.env` from the working directory when present. A missing file is
/// not an error; a malformed one is.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::DotEnv(err.to_string())),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let intake_finalize_mode = match optional_trimmed_env("INTAKE_FINALIZE_MODE") {
            Some(raw) => FinalizeMode::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "INTAKE_FINALIZE_MODE must be 'degrade' or 'strict', got '{raw}'"
                ))
            })?,
            None => FinalizeMode::default(),
        };

        let session_params_ttl_seconds = parse_u64_env("SESSION_PARAMS_TTL_SECONDS", 3600)?;
        if session_params_ttl_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SESSION_PARAMS_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        let session_params_sweep_seconds = parse_u64_env("SESSION_PARAMS_SWEEP_SECONDS", 60)?;
        if session_params_sweep_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SESSION_PARAMS_SWEEP_SECONDS must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: resolve_bind_addr(),
            database_url: optional_trimmed_env("DATABASE_URL"),
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 10)?,
            migrations_dir: env::var("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            session_params_ttl_seconds,
            session_params_sweep_seconds,
            intake_finalize_mode,
            intake_write_timeout_ms: parse_u64_env("INTAKE_WRITE_TIMEOUT_MS", 5000)?,
            cors_allowed_origins: parse_list_env(
                "CORS_ALLOWED_ORIGINS",
                DEFAULT_CORS_ALLOWED_ORIGINS,
            ),
            expose_debug_sessions: parse_bool_env("EXPOSE_DEBUG_SESSIONS", false)?,
        })
    }
}

fn resolve_bind_addr() -> String {
    if let Some(bind_addr) = optional_trimmed_env("API_BIND_ADDR") {
        return bind_addr;
    }

    match optional_trimmed_env("PORT") {
        Some(port) => format!("0.0.0.0:{port}"),
        None => DEFAULT_BIND_ADDR.to_string(),
    }
}
