//! Declarative access paths into JSON documents.
//!
//! Output parameters are mapped to access paths in the entity configuration.
//! Two forms exist, distinguished by the first element of the JSON array:
//!
//! - `[".", ["owner", "login"]]` walks nested object fields (a [`DictPath`]).
//! - `["*"]` or `["*", { "sha": ["sha"] }]` treats the response root as an
//!   array and expands it (a [`ListPath`]).
//!
//! Paths are parsed once, when the configuration is loaded, so evaluation
//! never has to re-inspect raw configuration values.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Root marker of a dictionary mapping.
pub const DICT_ROOT_MARKER: &str = ".";
/// Root marker of a list mapping.
pub const LIST_ROOT_MARKER: &str = "*";

/// Error raised while parsing an access path from configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessPathError {
    #[error("access path must be a non-empty array, got {0}")]
    NotAnArray(String),
    #[error("first element of an access path must be '.' (dictionary) or '*' (list), got {0}")]
    UnknownRootMarker(String),
    #[error("dictionary access path steps must be strings, got {0}")]
    InvalidStep(String),
    #[error("list access path accepts at most one inner mapping object, got {0}")]
    InvalidInnerMapping(String),
}

/// Failure to resolve a [`DictPath`] against a concrete JSON value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("key '{step}' not found at depth {depth}")]
pub struct PathNotFound {
    /// The step that could not be applied.
    pub step: String,
    /// Zero-based position of the step within the path.
    pub depth: usize,
}

/// A sequence of object keys applied left to right.
///
/// A step applied to an array is accepted when it parses as an index, so
/// `["items", "0", "id"]` reaches into the first element of `items`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictPath {
    steps: Vec<String>,
}

impl DictPath {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Walk `root` along the configured steps.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, PathNotFound> {
        let mut current = root;
        for (depth, step) in self.steps.iter().enumerate() {
            let next = match current {
                Value::Object(map) => map.get(step),
                Value::Array(items) => step.parse::<usize>().ok().and_then(|index| items.get(index)),
                _ => None,
            };
            current = next.ok_or_else(|| PathNotFound {
                step: step.clone(),
                depth,
            })?;
        }
        Ok(current)
    }

    fn parse_steps(raw: &[Value]) -> Result<Self, AccessPathError> {
        let steps = raw
            .iter()
            .map(|step| match step {
                Value::String(text) => Ok(text.clone()),
                other => Err(AccessPathError::InvalidStep(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }
}

impl fmt::Display for DictPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps.join("."))
    }
}

/// Expansion over a JSON array.
///
/// Without an inner mapping every array element is assigned verbatim to the
/// output parameter, so only the last element survives. With an inner mapping
/// one record is produced per element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPath {
    inner: Option<IndexMap<String, DictPath>>,
}

impl ListPath {
    pub fn whole_elements() -> Self {
        Self { inner: None }
    }

    pub fn with_inner_mapping(inner: IndexMap<String, DictPath>) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn inner_mapping(&self) -> Option<&IndexMap<String, DictPath>> {
        self.inner.as_ref()
    }
}

/// Parsed form of one `output_parameter_mapping` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum AccessPath {
    Dict(DictPath),
    List(ListPath),
}

impl AccessPath {
    /// Parse an access path from its configuration representation.
    ///
    /// The dictionary form accepts both `[".", ["a", "b"]]` and the flat
    /// `[".", "a", "b"]`. Inner paths of a list mapping are plain key
    /// sequences.
    pub fn parse(raw: &Value) -> Result<Self, AccessPathError> {
        let elements = match raw {
            Value::Array(elements) if !elements.is_empty() => elements,
            other => return Err(AccessPathError::NotAnArray(other.to_string())),
        };

        let marker = match &elements[0] {
            Value::String(marker) => marker.as_str(),
            other => return Err(AccessPathError::UnknownRootMarker(other.to_string())),
        };

        match marker {
            DICT_ROOT_MARKER => {
                let rest = &elements[1..];
                match rest {
                    [Value::Array(steps)] => Ok(Self::Dict(DictPath::parse_steps(steps)?)),
                    flat => Ok(Self::Dict(DictPath::parse_steps(flat)?)),
                }
            }
            LIST_ROOT_MARKER => match &elements[1..] {
                [] => Ok(Self::List(ListPath::whole_elements())),
                [Value::Object(inner)] => {
                    let mut mapping = IndexMap::with_capacity(inner.len());
                    for (name, path) in inner {
                        let steps = match path {
                            Value::Array(steps) => DictPath::parse_steps(steps)?,
                            Value::String(step) => DictPath::new([step.clone()]),
                            other => return Err(AccessPathError::InvalidStep(other.to_string())),
                        };
                        mapping.insert(name.clone(), steps);
                    }
                    Ok(Self::List(ListPath::with_inner_mapping(mapping)))
                }
                other => Err(AccessPathError::InvalidInnerMapping(Value::Array(other.to_vec()).to_string())),
            },
            other => Err(AccessPathError::UnknownRootMarker(other.to_string())),
        }
    }
}

impl TryFrom<Value> for AccessPath {
    type Error = AccessPathError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_dictionary_path() {
        let path = AccessPath::parse(&json!([".", ["owner", "login"]])).expect("parse");
        assert_eq!(path, AccessPath::Dict(DictPath::new(["owner", "login"])));
    }

    #[test]
    fn parses_flat_dictionary_path() {
        let path = AccessPath::parse(&json!([".", "owner", "login"])).expect("parse");
        assert_eq!(path, AccessPath::Dict(DictPath::new(["owner", "login"])));
    }

    #[test]
    fn parses_list_path_with_inner_mapping_in_declaration_order() {
        let path = AccessPath::parse(&json!(["*", {"sha": ["sha"], "date": ["commit", "author", "date"]}])).expect("parse");
        let AccessPath::List(list) = path else {
            panic!("expected list path");
        };
        let inner = list.inner_mapping().expect("inner mapping");
        let names = inner.keys().cloned().collect::<Vec<_>>();
        assert_eq!(names, vec!["sha".to_string(), "date".to_string()]);
        assert_eq!(inner["date"], DictPath::new(["commit", "author", "date"]));
    }

    #[test]
    fn parses_bare_list_path() {
        let path = AccessPath::parse(&json!(["*"])).expect("parse");
        assert_eq!(path, AccessPath::List(ListPath::whole_elements()));
    }

    #[test]
    fn rejects_unknown_root_marker() {
        let error = AccessPath::parse(&json!(["#", ["login"]])).unwrap_err();
        assert_eq!(error, AccessPathError::UnknownRootMarker("#".to_string()));
    }

    #[test]
    fn rejects_empty_and_non_array_paths() {
        assert!(matches!(AccessPath::parse(&json!([])), Err(AccessPathError::NotAnArray(_))));
        assert!(matches!(AccessPath::parse(&json!("login")), Err(AccessPathError::NotAnArray(_))));
    }

    #[test]
    fn deserializes_through_serde() {
        let path: AccessPath = serde_json::from_value(json!([".", ["login"]])).expect("deserialize");
        assert_eq!(path, AccessPath::Dict(DictPath::new(["login"])));
    }

    #[test]
    fn resolve_walks_objects_and_array_indices() {
        let document = json!({"items": [{"id": 7}], "owner": {"login": "octocat"}});
        assert_eq!(DictPath::new(["owner", "login"]).resolve(&document), Ok(&json!("octocat")));
        assert_eq!(DictPath::new(["items", "0", "id"]).resolve(&document), Ok(&json!(7)));
    }

    #[test]
    fn resolve_reports_first_missing_step() {
        let document = json!({"owner": {"login": "octocat"}});
        let error = DictPath::new(["owner", "name", "first"]).resolve(&document).unwrap_err();
        assert_eq!(error.step, "name");
        assert_eq!(error.depth, 1);
    }
}
