use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use retriever_util::http::{MalformedJsonError, PREVIEW_LIMIT, body_preview, parse_json_body};
use serde_json::Value;
use thiserror::Error;

/// Per-request failure at the HTTP boundary.
///
/// Every variant is terminal for the entity being retrieved, never for the
/// whole run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("HTTP {status}: {body_preview}")]
    Status { status: StatusCode, body_preview: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    MalformedBody(#[from] MalformedJsonError),
}

impl FetchError {
    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(error) => error.status(),
            _ => None,
        }
    }
}

/// Fetch a JSON document with a GET request.
///
/// Implementations must be safe to share: one fetcher serves every entity of
/// a collection.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, uri: &str) -> Result<Value, FetchError>;
}

/// A canned reply served by [`StaticFetcher`].
#[derive(Debug, Clone)]
pub enum CannedResponse {
    /// A 2xx response with the given JSON body.
    Json(Value),
    /// A 2xx response whose raw body is parsed strictly.
    Raw(String),
    /// A non-2xx response.
    Status(u16, String),
}

/// In-memory fetcher that answers from a fixed URI table and records every
/// request. URIs without an entry receive a 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, CannedResponse>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, uri: impl Into<String>, body: Value) -> Self {
        self.responses.insert(uri.into(), CannedResponse::Json(body));
        self
    }

    pub fn with_response(mut self, uri: impl Into<String>, response: CannedResponse) -> Self {
        self.responses.insert(uri.into(), response);
        self
    }

    /// URIs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JsonFetcher for StaticFetcher {
    async fn fetch_json(&self, uri: &str) -> Result<Value, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(uri.to_string());
        }

        match self.responses.get(uri) {
            Some(CannedResponse::Json(body)) => Ok(body.clone()),
            Some(CannedResponse::Raw(text)) => Ok(parse_json_body(text, Some(StatusCode::OK))?),
            Some(CannedResponse::Status(code, body)) => Err(FetchError::Status {
                status: StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body_preview: body_preview(body, PREVIEW_LIMIT),
            }),
            None => Err(FetchError::Status {
                status: StatusCode::NOT_FOUND,
                body_preview: "<empty>".to_string(),
            }),
        }
    }
}
