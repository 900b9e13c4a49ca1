//! # HTTP Utilities
//!
//! Helpers for HTTP responses received while retrieving entities: status
//! hints for failure logs and JSON body parsing.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Return a user-friendly hint for HTTP status codes commonly seen while
/// crawling third-party APIs.
///
/// # Arguments
/// * `status_code` - The HTTP status code
///
/// # Returns
/// `Some(error_message)` for known status codes, `None` for others
///
/// # Example
/// ```rust
/// use retriever_util::http::status_error_message;
///
/// let error_401 = status_error_message(401).unwrap();
/// assert!(error_401.contains("api_key"));
/// assert!(error_401.contains("Unauthorized"));
///
/// let error_429 = status_error_message(429).unwrap();
/// assert!(error_429.contains("delay"));
///
/// assert!(status_error_message(500).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: check the configured api_key".into()),
        403 => Some("Forbidden (403). Hint: the API may be rate limiting this client; increase the configured delay".into()),
        404 => Some("Not Found (404). Hint: check the uri_template and the input parameter values".into()),
        429 => Some("Too Many Requests (429). Hint: increase the configured delay range".into()),
        _ => None,
    }
}

/// Parse a response body that must be JSON.
///
/// Failures carry the response status and a shortened copy of the body so
/// that a failed entity can be diagnosed from the log line alone.
pub fn parse_json_body(text: &str, status: Option<StatusCode>) -> Result<Value, MalformedJsonError> {
    serde_json::from_str::<Value>(text).map_err(|source| MalformedJsonError {
        status,
        source,
        preview: body_preview(text, PREVIEW_LIMIT),
    })
}

/// Default preview length used by [`parse_json_body`].
pub const PREVIEW_LIMIT: usize = 200;

/// Single-line copy of a response body, cut after `limit` bytes.
///
/// Line breaks and tabs fold into one space. A blank body is shown as
/// `<empty>`.
pub fn body_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::with_capacity(limit.min(text.len()) + 3);
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        if matches!(ch, '\n' | '\r' | '\t') {
            if !preview.ends_with(' ') {
                preview.push(' ');
            }
        } else {
            preview.push(ch);
        }
    }

    preview.trim().to_string()
}

/// A response body that could not be parsed as JSON.
#[derive(Debug, Error)]
#[error("response body is not valid JSON (status {}): {source}; body: {preview}", status_label(.status))]
pub struct MalformedJsonError {
    status: Option<StatusCode>,
    #[source]
    source: serde_json::Error,
    preview: String,
}

impl MalformedJsonError {
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }
}

fn status_label(status: &Option<StatusCode>) -> String {
    status.map_or_else(|| "unknown".to_string(), |code| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_reports_status_and_preview() {
        let error = parse_json_body("<html>\nrate limited\n</html>", Some(StatusCode::OK)).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("status 200 OK"), "{message}");
        assert_eq!(error.status(), Some(StatusCode::OK));
        assert_eq!(error.preview(), "<html> rate limited </html>");
    }

    #[test]
    fn missing_status_is_labelled_unknown() {
        let error = parse_json_body("", None).unwrap_err();
        assert!(error.to_string().contains("status unknown"), "{error}");
        assert_eq!(error.preview(), "<empty>");
    }

    #[test]
    fn parses_commit_list() {
        let value = parse_json_body(r#"[{"sha": "abc"}]"#, None).expect("valid json");
        assert_eq!(value[0]["sha"], "abc");
    }

    #[test]
    fn preview_marks_empty_and_truncated_bodies() {
        assert_eq!(body_preview("   ", 10), "<empty>");
        assert_eq!(body_preview("abcdefghijkl", 4), "abcd...");
        assert_eq!(body_preview("a\r\n\tb", 10), "a b");
    }
}
