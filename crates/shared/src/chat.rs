use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::intake::finalize_intake;
use crate::nlu::{NluError, NluGateway};
use crate::repos::{IntakeRepository, StoreError};
use crate::session_params::SessionParamStore;

/// Sent back when the NLU service produced no text for a turn.
pub const FALLBACK_RESPONSE_LINE: &str = "Okay.";
const MAX_SESSION_ID_LEN: usize = 36;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// What happens when the finished intake cannot be persisted.
///
/// A write that times out may still have committed, so `saved: false` means
/// the save was not confirmed, not that nothing was stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Log the failure and still report the turn as successful.
    #[default]
    Degrade,
    /// Fail the turn with [`ChatError::Persistence`].
    Strict,
}

impl FinalizeMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "degrade" => Some(Self::Degrade),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub response_lines: Vec<String>,
    pub session_id: String,
    pub saved: bool,
    pub saved_intake_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    #[error(transparent)]
    Upstream(#[from] NluError),
    #[error("failed to persist intake: {0}")]
    Persistence(#[from] StoreError),
}

/// Runs one chat turn: NLU call, parameter accumulation and, once the
/// conversation ends, intake finalization.
#[derive(Clone)]
pub struct ChatOrchestrator {
    nlu: Arc<dyn NluGateway>,
    sessions: SessionParamStore,
    intakes: Arc<dyn IntakeRepository>,
    finalize_mode: FinalizeMode,
    write_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        nlu: Arc<dyn NluGateway>,
        sessions: SessionParamStore,
        intakes: Arc<dyn IntakeRepository>,
    ) -> Self {
        Self {
            nlu,
            sessions,
            intakes,
            finalize_mode: FinalizeMode::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_finalize_mode(mut self, finalize_mode: FinalizeMode) -> Self {
        self.finalize_mode = finalize_mode;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn sessions(&self) -> &SessionParamStore {
        &self.sessions
    }

    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        utterance: &str,
    ) -> Result<TurnOutcome, ChatError> {
        if utterance.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".to_string()));
        }
        let session_id = resolve_session_id(session_id)?;

        let turn = self.nlu.detect_intent(&session_id, utterance).await?;
        debug!(
            session_id = %session_id,
            page = turn.meta.page.as_deref().unwrap_or("-"),
            intent = turn.meta.intent.as_deref().unwrap_or("-"),
            by_end_intent = turn.meta.end_flags.by_end_intent,
            by_end_page = turn.meta.end_flags.by_end_page,
            by_phrase = turn.meta.end_flags.by_phrase,
            parameter_count = turn.parameters.len(),
            "nlu turn resolved"
        );

        self.sessions.merge(&session_id, turn.parameters);

        let mut saved_intake_id = None;
        if turn.is_conversation_end {
            let accumulated = self.sessions.consume_and_clear(&session_id);
            let finalized = tokio::time::timeout(
                self.write_timeout,
                finalize_intake(self.intakes.as_ref(), &accumulated),
            )
            .await
            .unwrap_or(Err(StoreError::Timeout));

            match finalized {
                Ok(record) => {
                    info!(
                        session_id = %session_id,
                        intake_id = %record.id,
                        "intake saved at end of conversation"
                    );
                    saved_intake_id = Some(record.id);
                }
                Err(err) => {
                    error!(session_id = %session_id, "failed to save intake: {err}");
                    if self.finalize_mode == FinalizeMode::Strict {
                        return Err(ChatError::Persistence(err));
                    }
                }
            }
        }

        let response_lines = if turn.response_lines.is_empty() {
            vec![FALLBACK_RESPONSE_LINE.to_string()]
        } else {
            turn.response_lines
        };

        Ok(TurnOutcome {
            response_lines,
            session_id,
            saved: saved_intake_id.is_some(),
            saved_intake_id,
        })
    }
}

fn resolve_session_id(session_id: Option<&str>) -> Result<String, ChatError> {
    let Some(session_id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(Uuid::new_v4().to_string());
    };

    let well_formed = session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !well_formed {
        return Err(ChatError::InvalidSessionId(
            "sessionId must be at most 36 letters, digits, '-' or '_'".to_string(),
        ));
    }

    Ok(session_id.to_string())
}
