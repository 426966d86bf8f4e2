use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::gateway::NluError;
use crate::config::ConfigError;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Fields read from a Google service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_after: DateTime<Utc>,
}

/// Exchanges a signed service-account assertion for OAuth access tokens and
/// caches each token until shortly before it expires.
#[derive(Clone)]
pub struct ServiceAccountTokenSource {
    client: reqwest::Client,
    client_email: String,
    token_url: String,
    encoding_key: Arc<EncodingKey>,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl ServiceAccountTokenSource {
    pub fn new(
        client: reqwest::Client,
        credentials: &ServiceAccountCredentials,
        token_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let private_key = credentials.private_key.replace("\\n", "\n");
        let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|err| {
            ConfigError::InvalidConfiguration(format!(
                "service account private key is not a valid RSA PEM: {err}"
            ))
        })?;

        let token_url = token_url_override
            .or_else(|| credentials.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        Ok(Self {
            client,
            client_email: credentials.client_email.clone(),
            token_url,
            encoding_key: Arc::new(encoding_key),
            cached: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn access_token(&self) -> Result<String, NluError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref()
            && now < token.refresh_after
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch_token(now).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn fetch_token(&self, now: DateTime<Utc>) -> Result<CachedToken, NluError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECONDS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|err| NluError::Auth(format!("failed to sign assertion: {err}")))?;

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    NluError::Timeout
                } else {
                    NluError::Unavailable("token_request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NluError::Auth(format!(
                "token endpoint status={}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|_| NluError::Auth("token_response_parse_failed".to_string()))?;

        let lifetime = parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECONDS);
        let refresh_after = now + Duration::seconds((lifetime - EXPIRY_MARGIN_SECONDS).max(0));
        debug!(expires_in = lifetime, "fetched service account access token");

        Ok(CachedToken {
            access_token: parsed.access_token,
            refresh_after,
        })
    }
}
