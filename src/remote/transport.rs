//! Transport seam between the board client and HTTP.
//!
//! The client issues [`ApiRequest`] values through the [`Transport`] trait,
//! so tests can substitute a scripted transport and every gateway behavior
//! (retry, pagination, idempotent delete) is exercisable without a network.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the remote gateway.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Non-success HTTP status from the board API.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, DNS, or timeout failure before any status arrived.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Response body was not the JSON shape the API documents.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    /// A call failed every attempt in the retry budget.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<RemoteError> },
}

/// HTTP verbs the board API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One wire call, transport-agnostic.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path under the API base, e.g. `/boards/{id}/items/bulk`.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON body for POST calls.
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Status and parsed body of one call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Retry-After header in seconds, when the service sent one.
    pub retry_after: Option<u64>,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The seam the board client talks through.
///
/// Non-2xx statuses come back as `Ok` with the status set, so retry and
/// idempotency decisions stay in the client; `Err` is reserved for failures
/// where no response arrived at all.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RemoteError>;
}

/// Real HTTP transport backed by a blocking ureq agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    base: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base: &str, token: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RemoteError> {
        let url = format!("{}{}", self.base, request.path);
        let mut req = match request.method {
            Method::Get => self.agent.get(&url),
            Method::Post => self.agent.post(&url),
            Method::Delete => self.agent.delete(&url),
        };
        req = req
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/json");
        for (key, value) in &request.query {
            req = req.query(key, value);
        }

        let result = match &request.body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };

        match result {
            Ok(resp) => Ok(read_response(resp)),
            Err(ureq::Error::Status(_, resp)) => Ok(read_response(resp)),
            Err(e) => Err(RemoteError::Transport(e.to_string())),
        }
    }
}

fn read_response(resp: ureq::Response) -> ApiResponse {
    let status = resp.status();
    let retry_after = resp
        .header("Retry-After")
        .and_then(|v| v.trim().parse().ok());
    let text = resp.into_string().unwrap_or_default();
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    ApiResponse {
        status,
        retry_after,
        body,
    }
}
