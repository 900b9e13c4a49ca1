//! Entity configuration document model.
//!
//! [`EntityConfigDocument`] mirrors the on-disk configuration one to one.
//! Semantic checks that need more context (callback resolution, name
//! collisions) are performed by the engine when it builds an
//! `EntityConfiguration` from the document.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::AccessPath;

/// Fields every configuration document must carry.
pub const REQUIRED_FIELDS: &[&str] = &[
    "name",
    "input_parameters",
    "output_parameter_mapping",
    "uri_template",
    "pre_request_callbacks",
    "post_request_callbacks",
    "api_key",
    "ignore_duplicates",
    "delay",
];

/// Request deadline applied when `timeout_ms` is not configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Raw entity configuration as read from a JSON or YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfigDocument {
    /// Entity type name; also the name of the exported table.
    pub name: String,
    /// Parameters identifying an entity (columns of the input table).
    pub input_parameters: Vec<String>,
    /// Output parameter name to access path, in declaration order.
    pub output_parameter_mapping: IndexMap<String, AccessPath>,
    /// URI skeleton with `{variable}` placeholders.
    pub uri_template: String,
    pub pre_request_callbacks: Vec<String>,
    pub post_request_callbacks: Vec<String>,
    /// Credential injected as the `{api_key}` template variable.
    pub api_key: String,
    pub ignore_duplicates: bool,
    /// Randomized politeness delay between requests, in milliseconds.
    pub delay: DelayRange,
    /// Output parameters whose extracted values are checked against expected
    /// values supplied alongside the input parameters.
    #[serde(default)]
    pub validation_parameters: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Treat a missing URI template variable as fatal instead of logging it.
    #[serde(default)]
    pub strict_uri_variables: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DelayRangeError {
    #[error("delay must have exactly two elements [min, max], got {0}")]
    WrongArity(usize),
    #[error("delay bounds must be non-negative, got [{min}, {max}]")]
    Negative { min: i64, max: i64 },
    #[error("delay minimum {min} exceeds maximum {max}")]
    Inverted { min: u64, max: u64 },
}

/// Inclusive `[min, max]` range of milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<i64>")]
pub struct DelayRange {
    min_ms: u64,
    max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Result<Self, DelayRangeError> {
        if min_ms > max_ms {
            return Err(DelayRangeError::Inverted { min: min_ms, max: max_ms });
        }
        Ok(Self { min_ms, max_ms })
    }

    /// A range that never sleeps.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }

    /// Clamp an arbitrary millisecond value into the range.
    pub fn clamp(&self, millis: u64) -> Duration {
        Duration::from_millis(millis.clamp(self.min_ms, self.max_ms))
    }
}

impl TryFrom<Vec<i64>> for DelayRange {
    type Error = DelayRangeError;

    fn try_from(bounds: Vec<i64>) -> Result<Self, Self::Error> {
        let &[min, max] = bounds.as_slice() else {
            return Err(DelayRangeError::WrongArity(bounds.len()));
        };
        if min < 0 || max < 0 {
            return Err(DelayRangeError::Negative { min, max });
        }
        Self::new(min as u64, max as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DictPath;
    use serde_json::json;

    fn minimal_document() -> serde_json::Value {
        json!({
            "name": "gh_users",
            "input_parameters": ["id"],
            "output_parameter_mapping": {
                "name": [".", ["login"]],
                "repos": ["*", {"full_name": ["full_name"]}]
            },
            "uri_template": "https://api.example.com/users/{id}?key={api_key}",
            "pre_request_callbacks": [],
            "post_request_callbacks": [],
            "api_key": "secret",
            "ignore_duplicates": true,
            "delay": [100, 250]
        })
    }

    #[test]
    fn deserializes_minimal_document_with_defaults() {
        let document: EntityConfigDocument = serde_json::from_value(minimal_document()).expect("deserialize");
        assert_eq!(document.name, "gh_users");
        assert_eq!(document.delay, DelayRange::new(100, 250).unwrap());
        assert_eq!(document.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!document.strict_uri_variables);
        assert!(document.validation_parameters.is_empty());
        let names = document.output_parameter_mapping.keys().cloned().collect::<Vec<_>>();
        assert_eq!(names, vec!["name".to_string(), "repos".to_string()]);
        assert_eq!(document.output_parameter_mapping["name"], AccessPath::Dict(DictPath::new(["login"])));
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
name: gh_users
input_parameters: [id]
output_parameter_mapping:
  name: [".", [login]]
uri_template: "https://api.example.com/users/{id}"
pre_request_callbacks: []
post_request_callbacks: []
api_key: ""
ignore_duplicates: false
delay: [0, 0]
"#;
        let document: EntityConfigDocument = serde_yaml::from_str(yaml).expect("deserialize yaml");
        assert!(document.delay.is_zero());
    }

    #[test]
    fn rejects_inverted_and_negative_delays() {
        assert_eq!(
            DelayRange::try_from(vec![500, 100]),
            Err(DelayRangeError::Inverted { min: 500, max: 100 })
        );
        assert_eq!(DelayRange::try_from(vec![-1, 100]), Err(DelayRangeError::Negative { min: -1, max: 100 }));
        assert_eq!(DelayRange::try_from(vec![1, 2, 3]), Err(DelayRangeError::WrongArity(3)));
    }

    #[test]
    fn unknown_root_marker_fails_document() {
        let mut raw = minimal_document();
        raw["output_parameter_mapping"]["name"] = json!(["?", ["login"]]);
        let error = serde_json::from_value::<EntityConfigDocument>(raw).unwrap_err();
        assert!(error.to_string().contains("'.' (dictionary) or '*' (list)"), "{error}");
    }

    #[test]
    fn clamp_stays_within_bounds() {
        let range = DelayRange::new(10, 20).unwrap();
        assert_eq!(range.clamp(5).as_millis(), 10);
        assert_eq!(range.clamp(50).as_millis(), 20);
        assert_eq!(range.clamp(15).as_millis(), 15);
    }
}
