use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use super::end_detection::detect_end;
use super::flatten::flatten_parameters;
use super::gateway::{NluError, NluGateway, NluGatewayFuture, TurnMeta, TurnResult};
use super::google_auth::{ServiceAccountCredentials, ServiceAccountTokenSource};
use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env, require_env};

const DEFAULT_LANGUAGE_CODE: &str = "en-US";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: u32 = 1;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub enum DialogflowCredentials {
    /// Pre-issued bearer token, mainly for local runs.
    StaticToken(String),
    ServiceAccount {
        credentials: ServiceAccountCredentials,
        token_url: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct DialogflowCxConfig {
    pub api_base_url: String,
    pub project_id: String,
    pub location: String,
    pub agent_id: String,
    pub language_code: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub credentials: DialogflowCredentials,
}

impl DialogflowCxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_id = require_env("GOOGLE_PROJECT_ID")?;
        let location = require_env("DIALOGFLOW_LOCATION")?;
        let agent_id = require_env("DIALOGFLOW_AGENT_ID")?;

        let api_base_url = optional_trimmed_env("DIALOGFLOW_API_BASE_URL")
            .unwrap_or_else(|| default_api_base_url(&location));
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidConfiguration(
                "DIALOGFLOW_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            api_base_url,
            project_id,
            location,
            agent_id,
            language_code: optional_trimmed_env("DIALOGFLOW_LANGUAGE_CODE")
                .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string()),
            timeout_ms: parse_u64_env("DIALOGFLOW_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            max_retries: parse_u32_env("DIALOGFLOW_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_backoff_ms: parse_u64_env(
                "DIALOGFLOW_RETRY_BASE_BACKOFF_MS",
                DEFAULT_RETRY_BASE_BACKOFF_MS,
            )?,
            credentials: credentials_from_env()?,
        })
    }
}

fn default_api_base_url(location: &str) -> String {
    if location == "global" {
        "https://dialogflow.googleapis.com".to_string()
    } else {
        format!("https://{location}-dialogflow.googleapis.com")
    }
}

fn credentials_from_env() -> Result<DialogflowCredentials, ConfigError> {
    let token_url = optional_trimmed_env("GOOGLE_TOKEN_URL");

    if let Some(raw_json) = optional_trimmed_env("GOOGLE_CREDENTIALS_JSON") {
        let credentials =
            serde_json::from_str::<ServiceAccountCredentials>(&raw_json).map_err(|err| {
                ConfigError::InvalidConfiguration(format!(
                    "GOOGLE_CREDENTIALS_JSON is not a service account key: {err}"
                ))
            })?;
        return Ok(DialogflowCredentials::ServiceAccount {
            credentials,
            token_url,
        });
    }

    if let (Some(client_email), Some(private_key)) = (
        optional_trimmed_env("GOOGLE_CLIENT_EMAIL"),
        optional_trimmed_env("GOOGLE_PRIVATE_KEY"),
    ) {
        return Ok(DialogflowCredentials::ServiceAccount {
            credentials: ServiceAccountCredentials {
                client_email,
                private_key,
                token_uri: None,
            },
            token_url,
        });
    }

    if let Some(token) = optional_trimmed_env("DIALOGFLOW_ACCESS_TOKEN") {
        return Ok(DialogflowCredentials::StaticToken(token));
    }

    Err(ConfigError::MissingVar(
        "GOOGLE_CREDENTIALS_JSON (or GOOGLE_CLIENT_EMAIL + GOOGLE_PRIVATE_KEY)".to_string(),
    ))
}

#[derive(Clone)]
enum TokenProvider {
    Static(String),
    ServiceAccount(ServiceAccountTokenSource),
}

impl TokenProvider {
    async fn bearer_token(&self) -> Result<String, NluError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(source) => source.access_token().await,
        }
    }
}

/// Dialogflow CX `detectIntent` over the v3 REST API.
#[derive(Clone)]
pub struct DialogflowCxClient {
    client: reqwest::Client,
    config: DialogflowCxConfig,
    tokens: TokenProvider,
}

impl DialogflowCxClient {
    pub fn new(config: DialogflowCxConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Url::parse(&config.api_base_url).map_err(|err| {
            ConfigError::InvalidConfiguration(format!("invalid Dialogflow base url: {err}"))
        })?;

        let tokens = match &config.credentials {
            DialogflowCredentials::StaticToken(token) => TokenProvider::Static(token.clone()),
            DialogflowCredentials::ServiceAccount {
                credentials,
                token_url,
            } => TokenProvider::ServiceAccount(ServiceAccountTokenSource::new(
                client.clone(),
                credentials,
                token_url.clone(),
            )?),
        };

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    fn session_url(&self, session_id: &str) -> Result<Url, NluError> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|_| NluError::Unavailable("invalid_base_url".to_string()))?;
        let detect_intent_segment = format!("{session_id}:detectIntent");
        url.path_segments_mut()
            .map_err(|_| NluError::Unavailable("invalid_base_url".to_string()))?
            .pop_if_empty()
            .extend([
                "v3",
                "projects",
                self.config.project_id.as_str(),
                "locations",
                self.config.location.as_str(),
                "agents",
                self.config.agent_id.as_str(),
                "sessions",
                detect_intent_segment.as_str(),
            ]);
        Ok(url)
    }

    async fn send_once(&self, session_id: &str, utterance: &str) -> Result<TurnResult, SendError> {
        let url = self.session_url(session_id).map_err(SendError::permanent)?;
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(SendError::permanent)?;

        let request_body = json!({
            "queryInput": {
                "text": { "text": utterance },
                "languageCode": self.config.language_code,
            }
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&request_body)
            .send()
            .await
            .map_err(|err| {
                // Only a refused connection proves the utterance never reached
                // the session; anything later may already have advanced the flow.
                if err.is_timeout() {
                    SendError::permanent(NluError::Timeout)
                } else if err.is_connect() {
                    SendError::retryable(NluError::Unavailable(
                        "connect_failed".to_string(),
                    ))
                } else {
                    SendError::permanent(NluError::Unavailable(
                        "request_unavailable".to_string(),
                    ))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|_| {
            SendError::permanent(NluError::InvalidPayload(
                "response_body_read_failed".to_string(),
            ))
        })?;

        if !status.is_success() {
            let error = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                NluError::Auth(format!("status={}", status.as_u16()))
            } else {
                NluError::Unavailable(format!("status={}", status.as_u16()))
            };
            return Err(SendError {
                error,
                retryable: is_retryable_status(status),
            });
        }

        let parsed: DetectIntentResponse = serde_json::from_str(&body).map_err(|_| {
            SendError::permanent(NluError::InvalidPayload(
                "response_json_parse_failed".to_string(),
            ))
        })?;
        let query_result = parsed.query_result.ok_or_else(|| {
            SendError::permanent(NluError::InvalidPayload(
                "missing_query_result".to_string(),
            ))
        })?;

        Ok(turn_result_from_query_result(query_result))
    }
}

impl NluGateway for DialogflowCxClient {
    fn detect_intent<'a>(
        &'a self,
        session_id: &'a str,
        utterance: &'a str,
    ) -> NluGatewayFuture<'a> {
        Box::pin(async move {
            let mut attempt = 0_u32;
            loop {
                match self.send_once(session_id, utterance).await {
                    Ok(result) => return Ok(result),
                    Err(err) => {
                        if err.retryable && attempt < self.config.max_retries {
                            let backoff_ms = self
                                .config
                                .retry_base_backoff_ms
                                .saturating_mul(2_u64.saturating_pow(attempt));
                            warn!(
                                attempt,
                                backoff_ms, "retrying Dialogflow request: {}", err.error
                            );
                            sleep(Duration::from_millis(backoff_ms)).await;
                            attempt = attempt.saturating_add(1);
                            continue;
                        }
                        return Err(err.error);
                    }
                }
            }
        })
    }
}

#[derive(Debug)]
struct SendError {
    error: NluError,
    retryable: bool,
}

impl SendError {
    fn retryable(error: NluError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn permanent(error: NluError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Statuses Dialogflow returns before touching session state.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    #[serde(default)]
    query_result: Option<QueryResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub response_messages: Vec<ResponseMessage>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub current_page: Option<Page>,
    #[serde(default, rename = "match")]
    pub intent_match: Option<IntentMatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub text: Option<ResponseText>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseText {
    #[serde(default)]
    pub text: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntentMatch {
    #[serde(default)]
    pub intent: Option<MatchedIntent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedIntent {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_end_interaction: bool,
}

/// Maps a `queryResult` payload to a turn result: text lines in message
/// order, flattened parameters, and the end-of-conversation verdict.
pub fn turn_result_from_query_result(result: QueryResult) -> TurnResult {
    let response_lines = result
        .response_messages
        .into_iter()
        .filter_map(|message| message.text)
        .filter(|text| !text.text.is_empty())
        .flat_map(|text| text.text)
        .collect::<Vec<_>>();

    let parameters = result
        .parameters
        .as_ref()
        .map(flatten_parameters)
        .unwrap_or_default();

    let page = result.current_page.unwrap_or_default();
    let intent = result
        .intent_match
        .and_then(|intent_match| intent_match.intent)
        .unwrap_or_default();

    let page_display_name = page.display_name.filter(|name| !name.is_empty());
    let end_flags = detect_end(
        intent.is_end_interaction,
        page_display_name.as_deref(),
        page.name.as_deref(),
        &response_lines,
    );

    TurnResult {
        response_lines,
        parameters,
        is_conversation_end: end_flags.is_end(),
        meta: TurnMeta {
            page: page_display_name,
            intent: intent.display_name.filter(|name| !name.is_empty()),
            end_flags,
        },
    }
}
