use std::collections::BTreeMap;

use serde::Serialize;

/// Accumulated or per-turn conversation parameters keyed by parameter id.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Plain parameter value extracted from the NLU service.
///
/// Serializes without tags so a `ParamMap` renders as ordinary JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(ParamMap),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text rendering for scalar values, strings returned as sent. Null,
    /// blank strings and containers have no text form.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::Text(value) => (!value.trim().is_empty()).then(|| value.clone()),
            Self::Number(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
