//! Evaluation of access paths against parsed responses.
//!
//! Extraction never fails as a whole. A parameter whose path cannot be
//! followed is logged and left absent, and its siblings are still extracted.

use retriever_types::{AccessPath, DictPath, ListPath};
use serde_json::{Map, Value};
use tracing::warn;

/// Extract the value of one output parameter from `response`.
///
/// Returns `None` when the parameter should stay absent.
pub fn extract_parameter(parameter: &str, path: &AccessPath, response: &Value) -> Option<Value> {
    match path {
        AccessPath::Dict(path) => extract_dict(parameter, path, response),
        AccessPath::List(path) => extract_list(parameter, path, response),
    }
}

fn extract_dict(parameter: &str, path: &DictPath, response: &Value) -> Option<Value> {
    match path.resolve(response) {
        Ok(value) => Some(value.clone()),
        Err(error) => {
            warn!(parameter, path = %path, %error, "could not retrieve data for parameter");
            None
        }
    }
}

fn extract_list(parameter: &str, path: &ListPath, response: &Value) -> Option<Value> {
    let Some(elements) = response.as_array() else {
        warn!(parameter, "list mapping configured but response root is not an array");
        return None;
    };

    match path.inner_mapping() {
        // Every element overwrites the previous one; only the last survives.
        None => elements.last().cloned(),
        Some(inner) => {
            let records = elements
                .iter()
                .map(|element| {
                    let record = inner
                        .iter()
                        .map(|(name, inner_path)| {
                            let value = inner_path.resolve(element).cloned().unwrap_or_else(|error| {
                                warn!(parameter, inner_parameter = %name, %error, "could not retrieve data for parameter");
                                Value::Null
                            });
                            (name.clone(), value)
                        })
                        .collect::<Map<String, Value>>();
                    Value::Object(record)
                })
                .collect();
            Some(Value::Array(records))
        }
    }
}

/// Text form of a JSON value used for validation comparisons and table cells.
///
/// Strings are returned without quotes, `null` becomes the empty string and
/// every other value is rendered as compact JSON.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Compare an expected validation value with an observed one after string
/// coercion. An absent observation compares like `null`.
pub fn validation_matches(expected: &Value, observed: Option<&Value>) -> bool {
    value_as_text(expected) == observed.map(value_as_text).unwrap_or_default()
}
