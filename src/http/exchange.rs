use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::deadline::Deadline;
use crate::error::Result;

/// Payload of an outbound request.
#[derive(Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Sent as the multipart form field `file`.
    File { file_name: String, bytes: Vec<u8> },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::File { file_name, bytes } => f
                .debug_struct("File")
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// One logical HTTP exchange. Replayed unchanged on every connection retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
    /// Upper bound for each attempt; further capped by the call deadline.
    pub timeout: Duration,
    /// Remote task this exchange belongs to, for error context.
    pub task_id: Option<String>,
}

impl ExchangeRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            timeout,
            task_id: None,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
            timeout,
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Performs one exchange and returns the body of a 2xx response.
///
/// Non-2xx responses surface as `Error::HttpStatus`; only failures before a
/// response arrived are retried by implementations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: ExchangeRequest, deadline: &Deadline) -> Result<Vec<u8>>;
}
