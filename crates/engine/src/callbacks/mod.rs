//! Callback registry and pipeline.
//!
//! Callbacks are plain Rust closures registered under string identifiers.
//! Configuration documents refer to them by name; names are resolved once,
//! when the configuration is loaded, and unknown names are rejected there.
//!
//! Two calling conventions exist:
//!
//! - [`CallbackSignature::Entity`] receives the entity only.
//! - [`CallbackSignature::EntityWithResponse`] additionally receives the
//!   parsed JSON response and is therefore only usable after the request.
//!
//! Both return `Ok(true)` to keep the entity. Pre-request callbacks cannot
//! veto an entity, so their return value is ignored. A `CallbackError` aborts
//! the whole run.

mod builtin;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{CallbackError, ConfigError, EngineError, EngineResult};

pub use builtin::{FILTER_PATCHES_WITH_CODE_BLOCK, SORT_COMMITS, VALIDATE_CODE_BLOCK_NORMALIZATION};

/// Hook receiving only the entity.
pub type EntityHook = Arc<dyn Fn(&mut Entity) -> Result<bool, CallbackError> + Send + Sync>;

/// Hook receiving the entity and the parsed response body.
pub type ResponseHook = Arc<dyn Fn(&mut Entity, &Value) -> Result<bool, CallbackError> + Send + Sync>;

/// Calling convention of a registered callback.
#[derive(Clone)]
pub enum CallbackSignature {
    Entity(EntityHook),
    EntityWithResponse(ResponseHook),
    /// A callback taking a number of arguments the pipeline cannot supply.
    /// Resolving it succeeds; invoking it fails.
    Unsupported { arity: usize },
}

impl CallbackSignature {
    pub fn arity(&self) -> usize {
        match self {
            Self::Entity(_) => 1,
            Self::EntityWithResponse(_) => 2,
            Self::Unsupported { arity } => *arity,
        }
    }
}

impl fmt::Debug for CallbackSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(_) => f.write_str("Entity"),
            Self::EntityWithResponse(_) => f.write_str("EntityWithResponse"),
            Self::Unsupported { arity } => write!(f, "Unsupported {{ arity: {arity} }}"),
        }
    }
}

/// A resolved callback: identifier plus implementation.
#[derive(Debug, Clone)]
pub struct Callback {
    name: String,
    signature: CallbackSignature,
}

impl Callback {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &CallbackSignature {
        &self.signature
    }
}

/// Table of callbacks available to configuration documents.
#[derive(Debug, Clone)]
pub struct CallbackRegistry {
    callbacks: IndexMap<String, CallbackSignature>,
}

impl CallbackRegistry {
    /// A registry without any callbacks.
    pub fn empty() -> Self {
        Self {
            callbacks: IndexMap::new(),
        }
    }

    /// A registry holding the built-in callbacks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin::register(&mut registry);
        registry
    }

    /// Register a callback that receives the entity only.
    ///
    /// Registering an existing name replaces the previous implementation.
    pub fn register_entity_hook<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Entity) -> Result<bool, CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), CallbackSignature::Entity(Arc::new(hook)));
        self
    }

    /// Register a callback that receives the entity and the parsed response.
    pub fn register_response_hook<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Entity, &Value) -> Result<bool, CallbackError> + Send + Sync + 'static,
    {
        self.callbacks
            .insert(name.into(), CallbackSignature::EntityWithResponse(Arc::new(hook)));
        self
    }

    /// Register a name whose implementation takes `arity` arguments.
    pub fn register_unsupported(&mut self, name: impl Into<String>, arity: usize) -> &mut Self {
        self.callbacks.insert(name.into(), CallbackSignature::Unsupported { arity });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.callbacks.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Result<Callback, ConfigError> {
        self.callbacks
            .get(name)
            .map(|signature| Callback {
                name: name.to_string(),
                signature: signature.clone(),
            })
            .ok_or_else(|| ConfigError::UnknownCallback(name.to_string()))
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Run pre-request callbacks in order.
pub(crate) fn run_pre_request(callbacks: &[Callback], entity: &mut Entity) -> EngineResult<()> {
    for callback in callbacks {
        debug!(callback = %callback.name, "running pre-request callback");
        match &callback.signature {
            CallbackSignature::Entity(hook) => {
                hook(entity).map_err(|source| callback_failed(callback, entity, source))?;
            }
            other => return Err(invalid_callback(callback, other.arity(), "pre-request callbacks take the entity only")),
        }
    }
    Ok(())
}

/// Run post-request callbacks in order.
///
/// Returns `false` as soon as one callback rejects the entity; the remaining
/// callbacks are not run.
pub(crate) fn run_post_request(callbacks: &[Callback], entity: &mut Entity, response: &Value) -> EngineResult<bool> {
    for callback in callbacks {
        debug!(callback = %callback.name, "running post-request callback");
        let keep = match &callback.signature {
            CallbackSignature::Entity(hook) => hook(entity),
            CallbackSignature::EntityWithResponse(hook) => hook(entity, response),
            CallbackSignature::Unsupported { arity } => {
                return Err(invalid_callback(callback, *arity, "expected 1 or 2 parameters"));
            }
        }
        .map_err(|source| callback_failed(callback, entity, source))?;

        if !keep {
            debug!(callback = %callback.name, "entity rejected by callback");
            return Ok(false);
        }
    }
    Ok(true)
}

fn invalid_callback(callback: &Callback, arity: usize, expectation: &str) -> EngineError {
    EngineError::InvalidCallback {
        name: callback.name.clone(),
        reason: format!("takes {arity} parameters, {expectation}"),
    }
}

fn callback_failed(callback: &Callback, entity: &Entity, source: CallbackError) -> EngineError {
    EngineError::Callback {
        name: callback.name.clone(),
        entity: entity.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntityConfiguration;
    use serde_json::json;

    fn entity() -> Entity {
        let configuration = EntityConfiguration::from_value(
            json!({
                "name": "gh_users",
                "input_parameters": ["id"],
                "output_parameter_mapping": {"name": [".", ["login"]]},
                "uri_template": "https://api.example.com/users/{id}",
                "pre_request_callbacks": [],
                "post_request_callbacks": [],
                "api_key": "",
                "ignore_duplicates": false,
                "delay": [0, 0]
            }),
            &CallbackRegistry::empty(),
        )
        .expect("configuration");
        Entity::new(Arc::new(configuration), [("id", "42")]).expect("entity")
    }

    #[test]
    fn unknown_names_fail_to_resolve() {
        let registry = CallbackRegistry::with_builtins();
        assert!(registry.contains(SORT_COMMITS));
        assert!(matches!(registry.resolve("nope"), Err(ConfigError::UnknownCallback(name)) if name == "nope"));
    }

    #[test]
    fn post_request_callbacks_see_previous_mutations_and_stop_on_reject() {
        let mut registry = CallbackRegistry::empty();
        registry
            .register_entity_hook("rename", |entity| {
                entity.set_output("name", json!("renamed"));
                Ok(true)
            })
            .register_response_hook("reject_if_renamed", |entity, response| {
                assert_eq!(response["login"], "octocat");
                Ok(entity.output("name") != Some(&json!("renamed")))
            })
            .register_entity_hook("never_reached", |_| panic!("callback after rejection must not run"));

        let callbacks = ["rename", "reject_if_renamed", "never_reached"]
            .iter()
            .map(|name| registry.resolve(name).unwrap())
            .collect::<Vec<_>>();

        let mut entity = entity();
        let keep = run_post_request(&callbacks, &mut entity, &json!({"login": "octocat"})).unwrap();
        assert!(!keep);
        assert_eq!(entity.output("name"), Some(&json!("renamed")));
    }

    #[test]
    fn unsupported_arity_is_rejected_when_invoked() {
        let mut registry = CallbackRegistry::empty();
        registry.register_unsupported("three_args", 3);
        let callbacks = vec![registry.resolve("three_args").unwrap()];

        let error = run_post_request(&callbacks, &mut entity(), &Value::Null).unwrap_err();
        assert!(matches!(error, EngineError::InvalidCallback { ref name, .. } if name == "three_args"));
        assert!(error.to_string().contains("3 parameters"));

        let error = run_pre_request(&callbacks, &mut entity()).unwrap_err();
        assert!(matches!(error, EngineError::InvalidCallback { .. }));
    }

    #[test]
    fn pre_request_callbacks_reject_response_hooks() {
        let mut registry = CallbackRegistry::empty();
        registry.register_response_hook("needs_response", |_, _| Ok(true));
        let callbacks = vec![registry.resolve("needs_response").unwrap()];
        assert!(matches!(
            run_pre_request(&callbacks, &mut entity()),
            Err(EngineError::InvalidCallback { .. })
        ));
    }

    #[test]
    fn callback_errors_abort_with_entity_identity() {
        let mut registry = CallbackRegistry::empty();
        registry.register_entity_hook("fails", |_| Err(CallbackError::MissingParameter("code_block".to_string())));
        let callbacks = vec![registry.resolve("fails").unwrap()];

        let error = run_pre_request(&callbacks, &mut entity()).unwrap_err();
        match error {
            EngineError::Callback { name, entity, source } => {
                assert_eq!(name, "fails");
                assert!(entity.contains("42"));
                assert_eq!(source, CallbackError::MissingParameter("code_block".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
