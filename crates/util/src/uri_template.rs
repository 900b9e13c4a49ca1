use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

static TEMPLATE_VARIABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("template variable pattern is valid"));

/// Raised when a template variable has no usable value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UriTemplateError {
    #[error("value for URI variable '{variable}' missing")]
    MissingVariable { variable: String },
}

/// Outcome of a lenient resolution: the URI plus the variables that could not
/// be substituted (their placeholders are left in place).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUri {
    pub uri: String,
    pub missing: Vec<String>,
}

/// A URI skeleton containing `{variable}` placeholders, e.g.
/// `https://api.example.com/v2/users/{host_id}?client_id={api_key}`.
///
/// Variable names consist of ASCII alphanumerics and underscores. Values are
/// inserted literally; no percent-encoding is applied, so callers must
/// pre-encode values that contain reserved characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    template: String,
}

impl UriTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Distinct variable names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        TEMPLATE_VARIABLE_REGEX
            .captures_iter(&self.template)
            .filter_map(|captures| captures.get(1).map(|name| name.as_str()))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Replace every placeholder with its value.
    ///
    /// # Errors
    /// Returns [`UriTemplateError::MissingVariable`] naming the first variable
    /// that is absent from `values` or mapped to an empty string.
    ///
    /// # Examples
    /// ```rust
    /// use indexmap::IndexMap;
    /// use retriever_util::UriTemplate;
    ///
    /// let template = UriTemplate::new("/repos/{owner}/{repo}/commits?owner={owner}");
    /// let mut values = IndexMap::new();
    /// values.insert("owner".to_string(), "rust-lang".to_string());
    /// values.insert("repo".to_string(), "cargo".to_string());
    ///
    /// let uri = template.resolve(&values).unwrap();
    /// assert_eq!(uri, "/repos/rust-lang/cargo/commits?owner=rust-lang");
    /// ```
    pub fn resolve(&self, values: &IndexMap<String, String>) -> Result<String, UriTemplateError> {
        let resolved = self.resolve_lenient(values);
        match resolved.missing.into_iter().next() {
            Some(variable) => Err(UriTemplateError::MissingVariable { variable }),
            None => Ok(resolved.uri),
        }
    }

    /// Replace every placeholder that has a non-empty value and report the rest.
    ///
    /// Substitution happens in a single pass over the template, so a value
    /// that itself looks like a placeholder is never expanded again.
    pub fn resolve_lenient(&self, values: &IndexMap<String, String>) -> ResolvedUri {
        let mut missing = IndexSet::new();
        let uri = TEMPLATE_VARIABLE_REGEX
            .replace_all(&self.template, |captures: &Captures| {
                let name = &captures[1];
                match values.get(name).filter(|value| !value.is_empty()) {
                    Some(value) => value.clone(),
                    None => {
                        missing.insert(name.to_string());
                        captures[0].to_string()
                    }
                }
            })
            .into_owned();

        ResolvedUri {
            uri,
            missing: missing.into_iter().collect(),
        }
    }
}
