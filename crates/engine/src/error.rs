//! Error taxonomy of the retrieval engine.
//!
//! Only fatal conditions are represented here. Per-entity data problems
//! (missing JSON fields, validation mismatches) and per-entity transport
//! failures are logged and recorded on the entity instead of being returned.

use std::io;
use std::path::PathBuf;

use retriever_types::{AccessPathError, DelayRangeError};
use retriever_util::UriTemplateError;
use thiserror::Error;

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors in the entity configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("configuration document must be an object")]
    NotAnObject,

    #[error("reading configuration failed: parameter '{field}' not found")]
    MissingField { field: String },

    #[error("invalid value for configuration parameter '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("invalid access path for output parameter '{parameter}': {source}")]
    InvalidAccessPath {
        parameter: String,
        #[source]
        source: AccessPathError,
    },

    #[error("invalid delay range: {0}")]
    InvalidDelay(#[from] DelayRangeError),

    #[error("parsing configuration failed: callback '{0}' not found")]
    UnknownCallback(String),

    #[error("input parameter '{0}' is declared more than once")]
    DuplicateInputParameter(String),

    #[error("output parameter '{0}' has the same name as an input parameter")]
    ParameterCollision(String),

    #[error("validation parameter '{0}' is not an output parameter")]
    UnknownValidationParameter(String),
}

/// Errors reading or writing tabular data.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing header in input table")]
    MissingHeader,

    #[error("wrong number of columns in input table: expected {expected:?}, got {found:?}")]
    ColumnCount { expected: Vec<String>, found: Vec<String> },

    #[error("unknown column name in input table: '{0}'")]
    UnknownColumn(String),

    #[error("column '{0}' appears more than once in input table")]
    DuplicateColumn(String),

    #[error("row {row}: no value for parameter '{parameter}'")]
    MissingValue { row: usize, parameter: String },

    #[error("delimiter must be a single byte, got '{0}'")]
    InvalidDelimiter(String),
}

/// Errors raised by callback implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("input parameter missing: {0}")]
    MissingParameter(String),

    #[error("{0}")]
    Configuration(String),
}

/// Fatal engine errors; any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("illegal input parameter '{parameter}': no value supplied")]
    MissingInputParameter { parameter: String },

    #[error("could not build URI for entity {entity}: {source}")]
    Uri {
        entity: String,
        #[source]
        source: UriTemplateError,
    },

    #[error("invalid callback '{name}': {reason}")]
    InvalidCallback { name: String, reason: String },

    #[error("callback '{name}' failed for entity {entity}: {source}")]
    Callback {
        name: String,
        entity: String,
        #[source]
        source: CallbackError,
    },

    #[error("parameter '{column}' is missing for entity {entity}")]
    MissingExportColumn { entity: String, column: String },

    #[error("could not create HTTP session: {0}")]
    HttpClient(String),
}
