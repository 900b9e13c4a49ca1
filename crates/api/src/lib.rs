//! API retriever HTTP client utilities.
//!
//! This crate owns the HTTP boundary of the retrieval engine. It focuses on:
//!
//! - Constructing one shared HTTP session with sensible defaults (cookie
//!   store, compression, JSON `Accept` header, request deadline)
//! - Validating request URIs before they hit the network
//! - Turning responses into JSON values or a typed [`FetchError`]
//!
//! The engine only depends on the [`JsonFetcher`] trait, so tests and dry
//! runs can substitute [`StaticFetcher`] for the real [`RetrieverClient`].
//!
//! # Example
//!
//! ```ignore
//! use retriever_api::{JsonFetcher, RetrieverClient};
//! use std::time::Duration;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let client = RetrieverClient::new(Duration::from_secs(30))?;
//!     let user = client.fetch_json("https://api.github.com/users/octocat").await?;
//!     println!("login: {}", user["login"]);
//!     Ok(())
//! }
//! ```

mod fetch;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url, header};
use retriever_util::http::{PREVIEW_LIMIT, body_preview, parse_json_body};
use serde_json::Value;
use tracing::debug;

pub use fetch::{CannedResponse, FetchError, JsonFetcher, StaticFetcher};

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` shared by every entity
/// of a collection.
///
/// Cloning is cheap and keeps the same connection pool and cookie store.
pub struct RetrieverClient {
    pub http: Client,
    pub user_agent: String,
}

impl RetrieverClient {
    /// Construct a [`RetrieverClient`] with the given per-request deadline.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(30).min(timeout))
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            user_agent: format!("api-retriever/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Build a GET request for an absolute URI.
    pub fn get(&self, uri: Url) -> RequestBuilder {
        self.http.get(uri).header(header::USER_AGENT, &self.user_agent)
    }
}

#[async_trait]
impl JsonFetcher for RetrieverClient {
    async fn fetch_json(&self, uri: &str) -> Result<Value, FetchError> {
        let start = Instant::now();
        let url = validate_request_uri(uri)?;

        let response = self.get(url).send().await?;
        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body_preview: body_preview(&body_text, PREVIEW_LIMIT),
            });
        }

        let parsed = parse_json_body(&body_text, Some(status))?;
        debug!(
            status = %status,
            body_len = body_text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "http request completed"
        );
        Ok(parsed)
    }
}

/// Validate that a resolved URI can be requested.
///
/// Rules:
/// - the URI must parse as an absolute URL
/// - the scheme must be `http` or `https`
/// - a host must be present
fn validate_request_uri(uri: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUri {
        uri: uri.to_string(),
        reason,
    };

    let parsed = Url::parse(uri).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}://'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("URI must include a host".to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use reqwest::StatusCode;

    /// Answer a single request with `response`; the raw request head is sent
    /// back on the returned channel.
    fn serve_once(response: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("local address");
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buffer[..read]),
                }
            }
            let _ = sender.send(String::from_utf8_lossy(&request).into_owned());
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        });

        (format!("http://{address}/users/42"), receiver)
    }

    fn client() -> RetrieverClient {
        RetrieverClient::new(Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn accepts_http_and_https_uris() {
        assert!(validate_request_uri("https://api.example.com/users/42").is_ok());
        assert!(validate_request_uri("http://localhost:8080/users/42").is_ok());
    }

    #[test]
    fn rejects_relative_and_non_http_uris() {
        assert!(matches!(
            validate_request_uri("/users/42"),
            Err(FetchError::InvalidUri { .. })
        ));
        let error = validate_request_uri("ftp://files.example.com/a").unwrap_err();
        assert!(error.to_string().contains("unsupported scheme"), "{error}");
    }

    #[test]
    fn unresolved_placeholder_is_percent_encoded() {
        let result = validate_request_uri("https://api.example.com/users/{id}");
        assert!(result.is_ok());
        assert!(result.unwrap().as_str().contains("%7Bid%7D"));
    }

    #[tokio::test]
    async fn client_reports_invalid_uri_without_network_access() {
        let client = RetrieverClient::new(Duration::from_secs(1)).expect("client");
        let error = client.fetch_json("not a uri").await.unwrap_err();
        assert!(matches!(error, FetchError::InvalidUri { .. }));
    }

    #[tokio::test]
    async fn parses_json_and_sends_default_headers() {
        let (uri, requests) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{\"login\":\"octo\"}",
        );

        let body = client().fetch_json(&uri).await.expect("json body");
        assert_eq!(body["login"], "octo");

        let request = requests.recv().expect("request head").to_ascii_lowercase();
        assert!(request.starts_with("get /users/42 "), "{request}");
        assert!(request.contains("accept: application/json"), "{request}");
        let user_agent = format!("user-agent: api-retriever/{}\r\n", env!("CARGO_PKG_VERSION"));
        assert!(request.contains(&user_agent), "{request}");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let (uri, _requests) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        );

        let error = client().fetch_json(&uri).await.unwrap_err();
        match error {
            FetchError::Status { status, ref body_preview } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body_preview, "busy");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_success_body_is_malformed() {
        let (uri, _requests) = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

        let error = client().fetch_json(&uri).await.unwrap_err();
        match error {
            FetchError::MalformedBody(ref parse_error) => {
                assert_eq!(parse_error.status(), Some(StatusCode::OK));
                assert_eq!(parse_error.preview(), "<empty>");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("local address");
        drop(listener);

        let error = client().fetch_json(&format!("http://{address}/users/42")).await.unwrap_err();
        assert!(matches!(error, FetchError::Transport(_)), "unexpected error {error:?}");
        assert_eq!(error.status(), None);
    }
}
