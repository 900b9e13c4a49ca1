//! A single entity and its request lifecycle.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use retriever_api::JsonFetcher;
use retriever_util::http::status_error_message;
use retriever_util::redact_secret;
use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::callbacks;
use crate::config::EntityConfiguration;
use crate::delay::PolitenessDelay;
use crate::error::{EngineError, EngineResult};
use crate::extractor::{extract_parameter, validation_matches};

/// Progress of an entity through its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Created,
    Delayed,
    Requesting,
    /// The request failed; the entity is not exported.
    Failed,
    /// Data was extracted and every post-request callback kept the entity.
    Succeeded,
    /// A post-request callback rejected the entity.
    Excluded,
}

impl EntityState {
    pub fn is_exportable(self) -> bool {
        self == Self::Succeeded
    }
}

/// One instance of a configured entity type.
///
/// Input parameters are fixed at construction. Every configured output
/// parameter starts out present but absent (`None`); callbacks may add or
/// remove output keys afterwards.
#[derive(Debug, Clone)]
pub struct Entity {
    configuration: Arc<EntityConfiguration>,
    input_parameters: IndexMap<String, String>,
    output_parameters: IndexMap<String, Option<Value>>,
    validation_parameters: IndexMap<String, Value>,
    uri: String,
    state: EntityState,
}

impl Entity {
    /// Create an entity from values for every configured input parameter.
    ///
    /// # Errors
    /// [`EngineError::MissingInputParameter`] when a configured input
    /// parameter has no value or an empty one, and [`EngineError::Uri`] when
    /// `strict_uri_variables` is set and a template variable cannot be filled.
    pub fn new<I, K, V>(configuration: Arc<EntityConfiguration>, values: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut supplied = values
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect::<IndexMap<String, String>>();

        let mut input_parameters = IndexMap::with_capacity(configuration.input_parameters.len());
        for parameter in &configuration.input_parameters {
            match supplied.swap_remove(parameter) {
                Some(value) if !value.is_empty() => {
                    input_parameters.insert(parameter.clone(), value);
                }
                _ => {
                    return Err(EngineError::MissingInputParameter {
                        parameter: parameter.clone(),
                    });
                }
            }
        }
        if !supplied.is_empty() {
            debug!(ignored = ?supplied.keys().collect::<Vec<_>>(), "ignoring values for unknown input parameters");
        }

        let output_parameters = configuration
            .output_parameter_mapping
            .keys()
            .map(|name| (name.clone(), None))
            .collect();

        let mut entity = Self {
            configuration,
            input_parameters,
            output_parameters,
            validation_parameters: IndexMap::new(),
            uri: String::new(),
            state: EntityState::Created,
        };
        entity.uri = entity.build_uri()?;
        Ok(entity)
    }

    fn build_uri(&self) -> EngineResult<String> {
        let mut variables = self.input_parameters.clone();
        variables.insert("api_key".to_string(), self.configuration.api_key.clone());

        let template = &self.configuration.uri_template;
        if self.configuration.strict_uri_variables {
            return template.resolve(&variables).map_err(|source| EngineError::Uri {
                entity: self.to_string(),
                source,
            });
        }

        let resolved = template.resolve_lenient(&variables);
        for variable in &resolved.missing {
            warn!(entity = %self, variable = %variable, "value for URI variable missing; placeholder left in place");
        }
        Ok(resolved.uri)
    }

    /// Attach an expected value for a validation parameter.
    pub fn with_validation(mut self, parameter: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.set_validation(parameter, expected);
        self
    }

    pub fn configuration(&self) -> &EntityConfiguration {
        &self.configuration
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn input(&self, name: &str) -> Option<&str> {
        self.input_parameters.get(name).map(String::as_str)
    }

    pub fn input_parameters(&self) -> &IndexMap<String, String> {
        &self.input_parameters
    }

    /// Overwrite the value of an existing input parameter. The URI is not
    /// rebuilt. Returns `false` when the parameter is not configured.
    pub fn set_input(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.input_parameters.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Value of an output parameter, if present and not absent.
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.output_parameters.get(name).and_then(Option::as_ref)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.output_parameters.get_mut(name).and_then(Option::as_mut)
    }

    pub fn output_parameters(&self) -> &IndexMap<String, Option<Value>> {
        &self.output_parameters
    }

    /// Set an output parameter, adding the key if needed.
    pub fn set_output(&mut self, name: impl Into<String>, value: Value) {
        self.output_parameters.insert(name.into(), Some(value));
    }

    /// Take the value of an output parameter, leaving it absent.
    pub fn take_output(&mut self, name: &str) -> Option<Value> {
        self.output_parameters.get_mut(name).and_then(Option::take)
    }

    /// Remove an output key entirely. Exporting an entity whose configured
    /// output key was removed is an error; use [`Entity::take_output`] to
    /// blank a value instead.
    pub fn remove_output(&mut self, name: &str) -> Option<Value> {
        self.output_parameters.shift_remove(name).flatten()
    }

    pub fn validation(&self, name: &str) -> Option<&Value> {
        self.validation_parameters.get(name)
    }

    pub fn validation_parameters(&self) -> &IndexMap<String, Value> {
        &self.validation_parameters
    }

    pub fn set_validation(&mut self, parameter: impl Into<String>, expected: impl Into<Value>) {
        self.validation_parameters.insert(parameter.into(), expected.into());
    }

    /// Input parameter values in configuration order; two entities are
    /// duplicates when their keys are equal.
    pub fn key(&self) -> Vec<String> {
        self.input_parameters.values().cloned().collect()
    }

    /// Whether both entities carry the same input parameter values.
    pub fn equals(&self, other: &Entity) -> bool {
        self.input_parameters.len() == other.input_parameters.len()
            && self
                .input_parameters
                .iter()
                .all(|(name, value)| other.input_parameters.get(name) == Some(value))
    }

    /// URI with credentials masked, suitable for log lines.
    pub fn redacted_uri(&self) -> String {
        redact_secret(&self.uri, &self.configuration.api_key)
    }

    /// Run the complete request lifecycle for this entity.
    ///
    /// Transport failures are logged and leave the entity in
    /// [`EntityState::Failed`]; only callback and configuration problems are
    /// returned as errors.
    pub async fn retrieve_data(&mut self, fetcher: &dyn JsonFetcher, delay: &PolitenessDelay) -> EngineResult<EntityState> {
        let span = info_span!("entity", entity = %self);
        self.run_lifecycle(fetcher, delay).instrument(span).await
    }

    async fn run_lifecycle(&mut self, fetcher: &dyn JsonFetcher, delay: &PolitenessDelay) -> EngineResult<EntityState> {
        let configuration = Arc::clone(&self.configuration);
        info!("retrieving data");

        callbacks::run_pre_request(&configuration.pre_request_callbacks, self)?;

        self.state = EntityState::Delayed;
        delay.wait().await;

        self.state = EntityState::Requesting;
        let started = Instant::now();
        let response = match fetcher.fetch_json(&self.uri).await {
            Ok(response) => response,
            Err(fetch_error) => {
                let status = fetch_error.status().map(|status| status.as_u16());
                error!(
                    uri = %self.redacted_uri(),
                    status = ?status,
                    hint = %status.and_then(status_error_message).unwrap_or_default(),
                    error = %redact_secret(&fetch_error.to_string(), &configuration.api_key),
                    "could not retrieve data"
                );
                self.state = EntityState::Failed;
                return Ok(self.state);
            }
        };
        info!(duration_ms = started.elapsed().as_millis() as u64, "successfully retrieved data");

        self.extract_output_parameters(&response);

        let keep = callbacks::run_post_request(&configuration.post_request_callbacks, self, &response)?;
        self.state = if keep { EntityState::Succeeded } else { EntityState::Excluded };
        if !keep {
            info!("entity excluded by post-request callback");
        }
        Ok(self.state)
    }

    /// Populate output parameters from a parsed response and check
    /// validation parameters against the extracted values.
    pub fn extract_output_parameters(&mut self, response: &Value) {
        let configuration = Arc::clone(&self.configuration);
        for (parameter, path) in &configuration.output_parameter_mapping {
            let value = extract_parameter(parameter, path, response);
            self.check_validation(parameter, value.as_ref());
            self.output_parameters.insert(parameter.clone(), value);
        }
    }

    fn check_validation(&mut self, parameter: &str, observed: Option<&Value>) {
        let Some(expected) = self.validation_parameters.get_mut(parameter) else {
            return;
        };
        if validation_matches(expected, observed) {
            debug!(parameter, "validation succeeded");
            return;
        }
        let observed = observed.cloned().unwrap_or(Value::Null);
        warn!(parameter, expected = %expected, observed = %observed, "validation failed");
        *expected = observed;
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.configuration.name)?;
        for (index, (name, value)) in self.input_parameters.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}
