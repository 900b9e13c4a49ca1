//! Entity configuration loading and validation.
//!
//! An [`EntityConfiguration`] is built once from a configuration document
//! and then shared read-only (behind an `Arc`) by every entity of that type.
//! Every problem found here is a fatal [`ConfigError`] naming the offending
//! field or value.

use std::{fs, path::Path, time::Duration};

use indexmap::{IndexMap, IndexSet};
use retriever_types::{AccessPath, DelayRange, EntityConfigDocument, REQUIRED_FIELDS};
use retriever_util::{UriTemplate, strip_json_comments};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::callbacks::{Callback, CallbackRegistry};
use crate::error::ConfigError;

/// Immutable description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityConfiguration {
    /// Entity type name; the exported table is named after it.
    pub name: String,
    /// Ordered names of the parameters identifying an entity.
    pub input_parameters: Vec<String>,
    /// Output parameter name to access path, in declaration order.
    pub output_parameter_mapping: IndexMap<String, AccessPath>,
    pub uri_template: UriTemplate,
    pub api_key: String,
    pub pre_request_callbacks: Vec<Callback>,
    pub post_request_callbacks: Vec<Callback>,
    pub ignore_duplicates: bool,
    pub delay: DelayRange,
    pub validation_parameters: Vec<String>,
    /// Per-request deadline of the HTTP session.
    pub timeout: Duration,
    pub strict_uri_variables: bool,
}

impl EntityConfiguration {
    /// Load a configuration file, choosing the format by extension.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML; everything else is parsed
    /// as JSON with `//` and `/* */` comments allowed.
    pub fn load(path: impl AsRef<Path>, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(path.extension().and_then(|extension| extension.to_str()), Some("yaml" | "yml"));
        let configuration = if is_yaml {
            Self::from_yaml_str(&content, registry)?
        } else {
            Self::from_json_str(&content, registry)?
        };

        debug!(
            path = %path.display(),
            entity_type = %configuration.name,
            input_parameter_count = configuration.input_parameters.len(),
            output_parameter_count = configuration.output_parameter_mapping.len(),
            "entity configuration loaded"
        );
        Ok(configuration)
    }

    /// Parse a JSON document; comments are stripped before parsing.
    pub fn from_json_str(text: &str, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        let stripped = strip_json_comments(text);
        let value: Value = serde_json::from_str(&stripped).map_err(|error| ConfigError::Parse(error.to_string()))?;
        Self::from_value(value, registry)
    }

    pub fn from_yaml_str(text: &str, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(text).map_err(|error| ConfigError::Parse(error.to_string()))?;
        Self::from_value(value, registry)
    }

    /// Build a configuration from an untyped document.
    ///
    /// Required fields, access paths and the delay range are checked
    /// individually first so that errors name the field at fault.
    pub fn from_value(value: Value, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or(ConfigError::NotAnObject)?;

        if let Some(field) = REQUIRED_FIELDS.iter().find(|field| !object.contains_key(**field)) {
            return Err(ConfigError::MissingField {
                field: field.to_string(),
            });
        }

        match object.get("output_parameter_mapping") {
            Some(Value::Object(mapping)) => {
                for (parameter, raw_path) in mapping {
                    AccessPath::parse(raw_path).map_err(|source| ConfigError::InvalidAccessPath {
                        parameter: parameter.clone(),
                        source,
                    })?;
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidField {
                    field: "output_parameter_mapping".to_string(),
                    message: format!("expected an object, got {other}"),
                });
            }
            None => {}
        }

        if let Some(raw_delay) = object.get("delay") {
            let bounds = Vec::<i64>::deserialize(raw_delay).map_err(|error| ConfigError::InvalidField {
                field: "delay".to_string(),
                message: error.to_string(),
            })?;
            DelayRange::try_from(bounds)?;
        }

        let document: EntityConfigDocument =
            serde_json::from_value(value).map_err(|error| ConfigError::Parse(error.to_string()))?;
        Self::from_document(document, registry)
    }

    /// Validate a typed document and resolve its callbacks.
    pub fn from_document(document: EntityConfigDocument, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        if document.timeout_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "timeout_ms".to_string(),
                message: "request timeout must be at least 1 ms".to_string(),
            });
        }

        let mut seen_inputs = IndexSet::new();
        for parameter in &document.input_parameters {
            if !seen_inputs.insert(parameter.as_str()) {
                return Err(ConfigError::DuplicateInputParameter(parameter.clone()));
            }
        }

        if let Some(collision) = document
            .output_parameter_mapping
            .keys()
            .find(|name| seen_inputs.contains(name.as_str()))
        {
            return Err(ConfigError::ParameterCollision(collision.clone()));
        }

        if let Some(unknown) = document
            .validation_parameters
            .iter()
            .find(|name| !document.output_parameter_mapping.contains_key(name.as_str()))
        {
            return Err(ConfigError::UnknownValidationParameter(unknown.clone()));
        }

        let pre_request_callbacks = resolve_callbacks(&document.pre_request_callbacks, registry)?;
        let post_request_callbacks = resolve_callbacks(&document.post_request_callbacks, registry)?;

        Ok(Self {
            name: document.name,
            input_parameters: document.input_parameters,
            output_parameter_mapping: document.output_parameter_mapping,
            uri_template: UriTemplate::new(document.uri_template),
            api_key: document.api_key,
            pre_request_callbacks,
            post_request_callbacks,
            ignore_duplicates: document.ignore_duplicates,
            delay: document.delay,
            validation_parameters: document.validation_parameters,
            timeout: Duration::from_millis(document.timeout_ms),
            strict_uri_variables: document.strict_uri_variables,
        })
    }

    /// Replace the configured API key, e.g. with one supplied on the command line.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Columns expected in the input table: input parameters followed by
    /// validation parameters.
    pub fn input_columns(&self) -> Vec<String> {
        self.input_parameters
            .iter()
            .chain(self.validation_parameters.iter())
            .cloned()
            .collect()
    }

    /// Columns of the exported table: input parameters followed by output
    /// parameters in declaration order.
    pub fn export_columns(&self) -> Vec<String> {
        self.input_parameters
            .iter()
            .chain(self.output_parameter_mapping.keys())
            .cloned()
            .collect()
    }
}

fn resolve_callbacks(names: &[String], registry: &CallbackRegistry) -> Result<Vec<Callback>, ConfigError> {
    names.iter().map(|name| registry.resolve(name)).collect()
}
