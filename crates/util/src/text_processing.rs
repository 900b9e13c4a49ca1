//! # Text Processing Utilities
//!
//! This module provides utilities for text processing: redaction of
//! credentials before they reach log output, and removal of comments from
//! JSON configuration documents.

use once_cell::sync::Lazy;
use regex::Regex;

/// Redacts values that look like secrets in a string.
///
/// This function scans input text for patterns that commonly carry
/// credentials in retrieval logs: authorization headers, bearer tokens, and
/// credential-bearing query parameters of request URIs. Matching values are
/// replaced with `[REDACTED]` while the parameter names are preserved for
/// debugging purposes.
///
/// # Arguments
/// * `input` - The input string that may contain sensitive information
///
/// # Returns
/// A new string with sensitive values redacted
///
/// # Example
/// ```rust
/// use retriever_util::text_processing::redact_sensitive;
///
/// let input = "https://api.example.com/v2/users/7?client_id=abc123&locale=en";
/// let redacted = redact_sensitive(input);
/// assert_eq!(redacted, "https://api.example.com/v2/users/7?client_id=[REDACTED]&locale=en");
///
/// let input = "Authorization: Bearer secret123";
/// let redacted = redact_sensitive(input);
/// assert_eq!(redacted, "Authorization: [REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();

    for pattern in get_redact_patterns().iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}{}", prefix, replacement)
            })
            .to_string();
    }

    redacted
}

/// Redacts a known secret, then applies the pattern-based redaction of
/// [`redact_sensitive`].
///
/// Used for request URIs into which a configured API key was substituted
/// under an arbitrary parameter name. An occurrence is masked only when it
/// forms a whole URI token (a path segment, query value, etc.), so a short
/// secret never masks fragments of host names or other values.
pub fn redact_secret(input: &str, secret: &str) -> String {
    if secret.is_empty() {
        return redact_sensitive(input);
    }

    let mut masked = String::with_capacity(input.len());
    let mut copied = 0;
    for (start, _) in input.match_indices(secret) {
        let end = start + secret.len();
        let starts_token = input[..start].chars().next_back().is_none_or(is_token_boundary);
        let ends_token = input[end..].chars().next().is_none_or(is_token_boundary);
        if starts_token && ends_token {
            masked.push_str(&input[copied..start]);
            masked.push_str("[REDACTED]");
            copied = end;
        }
    }
    masked.push_str(&input[copied..]);

    redact_sensitive(&masked)
}

fn is_token_boundary(character: char) -> bool {
    character.is_whitespace() || matches!(character, '/' | '?' | '&' | '=' | '#' | ';' | ',' | '(' | ')' | '"' | '\'')
}

/// Returns compiled regex patterns for detecting sensitive information.
///
/// Every pattern captures the key portion in group 1; the remainder of the
/// match is replaced.
pub fn get_redact_patterns() -> &'static Vec<Regex> {
    static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

    &REDACT_PATTERNS
}

fn build_redact_patterns() -> Vec<Regex> {
    const QUERY_KEYWORDS: &[&str] = &[
        "access_token",
        "api_key",
        "apikey",
        "client_id",
        "client_secret",
        "key",
        "password",
        "secret",
        "sig",
        "signature",
        "token",
    ];
    let query_fragment = QUERY_KEYWORDS.iter().map(|keyword| regex::escape(keyword)).collect::<Vec<_>>().join("|");
    let query_parameter = format!(r"(?i)([?&](?:{query_fragment})=)([^&#\s]+)");

    vec![
        Regex::new(r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)").expect("authorization pattern is valid"),
        Regex::new(r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)").expect("bearer pattern is valid"),
        Regex::new(&query_parameter).expect("query parameter pattern is valid"),
    ]
}

/// Removes `//` line comments and `/* */` block comments from a JSON document.
///
/// Comment markers inside string literals (including escaped quotes) are left
/// untouched. Line comments keep their terminating newline so that parser
/// error positions still point at the right line; block comments collapse to a
/// single space. An unterminated block comment swallows the rest of the input.
///
/// # Example
/// ```rust
/// use retriever_util::strip_json_comments;
///
/// let raw = "{\n  // entity name\n  \"uri\": \"https://x.test/a//b\" /* inline */\n}";
/// let stripped = strip_json_comments(raw);
/// let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
/// assert_eq!(value["uri"], "https://x.test/a//b");
/// ```
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut characters = input.chars().peekable();
    let mut in_string = false;

    while let Some(character) = characters.next() {
        if in_string {
            output.push(character);
            match character {
                '\\' => {
                    if let Some(escaped) = characters.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (character, characters.peek().copied()) {
            ('"', _) => {
                in_string = true;
                output.push(character);
            }
            ('/', Some('/')) => {
                for skipped in characters.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                characters.next();
                let mut previous = '\0';
                for skipped in characters.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
                output.push(' ');
            }
            _ => output.push(character),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credential_query_parameters() {
        let input = "GET https://api.example.com/users/1?client_id=abc&access_token=xyz&page=2";
        assert_eq!(
            redact_sensitive(input),
            "GET https://api.example.com/users/1?client_id=[REDACTED]&access_token=[REDACTED]&page=2"
        );
    }

    #[test]
    fn ignores_non_sensitive_query_parameters() {
        let input = "https://api.example.com/users/1?monkey=banana&page=2";
        assert_eq!(redact_sensitive(input), input);
    }

    #[test]
    fn redacts_known_secret_as_whole_token() {
        let input = "https://api.example.com/users/1/s3cr3t-value/profile";
        assert_eq!(
            redact_secret(input, "s3cr3t-value"),
            "https://api.example.com/users/1/[REDACTED]/profile"
        );
        assert_eq!(redact_secret(input, ""), input);

        assert_eq!(
            redact_secret("https://api.example.com/users?auth=s3cr3t&page=2", "s3cr3t"),
            "https://api.example.com/users?auth=[REDACTED]&page=2"
        );
        assert_eq!(
            redact_secret("error sending request for url (https://x.test/k/s3cr3t)", "s3cr3t"),
            "error sending request for url (https://x.test/k/[REDACTED])"
        );
    }

    #[test]
    fn short_secret_leaves_surrounding_text_intact() {
        let input = "https://api.example.com/repos/a/commits?key2=a";
        assert_eq!(redact_secret(input, "a"), "https://api.example.com/repos/[REDACTED]/commits?key2=[REDACTED]");
        assert_eq!(redact_secret("https://api.example.com/users/1", "a"), "https://api.example.com/users/1");
    }

    #[test]
    fn strips_line_and_block_comments() {
        let raw = r#"{
  // the entity name
  "name": "users", /* trailing
  block */ "delay": [0, 0]
}"#;
        let stripped = strip_json_comments(raw);
        let value: serde_json::Value = serde_json::from_str(&stripped).expect("valid json");
        assert_eq!(value["name"], "users");
        assert_eq!(value["delay"], serde_json::json!([0, 0]));
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        let raw = r#"{"uri": "https://example.com/a//b/*c*/", "quote": "say \"//hi\""}"#;
        assert_eq!(strip_json_comments(raw), raw);
    }

    #[test]
    fn line_comment_preserves_newline() {
        assert_eq!(strip_json_comments("1 // one\n2"), "1 \n2");
    }
}
