use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use thiserror::Error;

use super::end_detection::EndFlags;
use crate::params::ParamMap;

pub type NluGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TurnResult, NluError>> + Send + 'a>>;

/// Outcome of one utterance sent to the NLU service.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    pub response_lines: Vec<String>,
    /// Parameters extracted on this turn only.
    pub parameters: ParamMap,
    pub is_conversation_end: bool,
    pub meta: TurnMeta,
}

/// Diagnostic detail about how the NLU service resolved the turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMeta {
    pub page: Option<String>,
    pub intent: Option<String>,
    pub end_flags: EndFlags,
}

#[derive(Debug, Error)]
pub enum NluError {
    #[error("nlu service request timed out")]
    Timeout,
    #[error("nlu service unavailable: {0}")]
    Unavailable(String),
    #[error("nlu service returned an invalid payload: {0}")]
    InvalidPayload(String),
    #[error("nlu service authentication failed: {0}")]
    Auth(String),
}

pub trait NluGateway: Send + Sync {
    fn detect_intent<'a>(&'a self, session_id: &'a str, utterance: &'a str)
    -> NluGatewayFuture<'a>;
}
