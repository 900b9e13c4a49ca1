//! # Retriever Engine
//!
//! Configuration-driven retrieval of entities from JSON HTTP APIs.
//!
//! An [`EntityConfiguration`] describes one entity type: which input
//! parameters identify an entity, how its request URI is built, which values
//! are extracted from the JSON response and which callbacks run before and
//! after the request. An [`EntityCollection`] loads entities from a delimited
//! input table, retrieves them one after another and exports the enriched
//! rows to a table named after the configuration.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use retriever_api::StaticFetcher;
//! use retriever_engine::{CallbackRegistry, EntityCollection, EntityConfiguration};
//! use serde_json::json;
//!
//! let configuration = EntityConfiguration::from_json_str(
//!     r#"{
//!         // one user per input row
//!         "name": "gh_users",
//!         "input_parameters": ["id"],
//!         "output_parameter_mapping": {"name": [".", ["login"]]},
//!         "uri_template": "https://api.example.com/users/{id}",
//!         "pre_request_callbacks": [],
//!         "post_request_callbacks": [],
//!         "api_key": "",
//!         "ignore_duplicates": false,
//!         "delay": [0, 0]
//!     }"#,
//!     &CallbackRegistry::default(),
//! )?;
//!
//! let fetcher = StaticFetcher::new().with_json("https://api.example.com/users/42", json!({"login": "octocat"}));
//! let mut collection = EntityCollection::with_fetcher(configuration, Arc::new(fetcher));
//! collection.load_from_table("id\n42\n".as_bytes(), b',')?;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! runtime.block_on(collection.retrieve_all())?;
//!
//! let mut output = Vec::new();
//! collection.export_to_table(&mut output, b',')?;
//! assert_eq!(String::from_utf8(output)?, "id,name\n42,octocat\n");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`config`**: loading and validation of entity configurations
//! - **`extractor`**: evaluation of access paths against responses
//! - **`entity`**: one entity and its request lifecycle
//! - **`callbacks`**: callback registry, pipeline and built-in callbacks
//! - **`collection`**: ingestion, sequential retrieval and export
//! - **`table`**: delimited-text input and output

pub mod callbacks;
pub mod collection;
pub mod config;
pub mod delay;
pub mod entity;
pub mod error;
pub mod extractor;
pub mod table;

pub use callbacks::{Callback, CallbackRegistry, CallbackSignature, EntityHook, ResponseHook};
pub use collection::{EntityCollection, ExportSummary, RetrievalSummary};
pub use config::EntityConfiguration;
pub use delay::PolitenessDelay;
pub use entity::{Entity, EntityState};
pub use error::{CallbackError, ConfigError, EngineError, EngineResult, TableError};
pub use table::{InputRow, parse_delimiter};
