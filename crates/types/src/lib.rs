//! Shared type definitions for the API retriever.
//!
//! The types in this crate are pure data: they describe an entity
//! configuration document as it is read from disk and the declarative
//! access paths used to locate values inside JSON responses. Behavior that
//! needs I/O, logging, or callbacks lives in `retriever-engine`.

pub mod access_path;
pub mod config;

pub use access_path::{AccessPath, AccessPathError, DICT_ROOT_MARKER, DictPath, LIST_ROOT_MARKER, ListPath, PathNotFound};
pub use config::{DEFAULT_TIMEOUT_MS, DelayRange, DelayRangeError, EntityConfigDocument, REQUIRED_FIELDS};
