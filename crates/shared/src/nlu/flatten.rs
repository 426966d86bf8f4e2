use serde_json::{Map, Value};

use crate::params::{ParamMap, ParamValue};

/// Converts the NLU service's parameter struct into plain parameter values.
///
/// Total over any JSON input: shapes without a plain counterpart become
/// [`ParamValue::Null`].
pub fn flatten_parameters(fields: &Map<String, Value>) -> ParamMap {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), flatten_value(value)))
        .collect()
}

pub fn flatten_value(value: &Value) -> ParamValue {
    match value {
        Value::Null => ParamValue::Null,
        Value::Bool(flag) => ParamValue::Bool(*flag),
        Value::Number(number) => number
            .as_f64()
            .map(ParamValue::Number)
            .unwrap_or(ParamValue::Null),
        Value::String(text) => ParamValue::Text(text.clone()),
        Value::Array(items) => ParamValue::List(items.iter().map(flatten_value).collect()),
        Value::Object(fields) => ParamValue::Map(flatten_parameters(fields)),
    }
}
