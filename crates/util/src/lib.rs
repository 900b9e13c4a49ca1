pub mod http;
pub mod java_normalization;
pub mod text_processing;
pub mod uri_template;

pub use java_normalization::{added_lines, normalize_java};
pub use text_processing::{redact_secret, redact_sensitive, redact_sensitive_with, strip_json_comments};
pub use uri_template::{ResolvedUri, UriTemplate, UriTemplateError};
