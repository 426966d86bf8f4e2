use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Complete")]
    Complete,
}

impl IntakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Complete => "Complete",
        }
    }
}

/// Persisted intake document as served to the review dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_name: String,
    pub appointment_time: String,
    pub intake_status: IntakeStatus,
    pub chief_complaint: String,
    pub symptoms: Vec<String>,
    pub medical_history: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendRequest {
    #[serde(default)]
    pub message: Option<Value>,
    /// Left loosely typed so a non-string id gets its own error.
    #[serde(default)]
    pub session_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendResponse {
    pub response: Vec<String>,
    pub session_id: String,
    pub saved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdateRequest {
    #[serde(default)]
    pub reviewed: Option<bool>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub ok: bool,
    pub you_sent: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
