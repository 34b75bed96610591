//! Error taxonomy for the client.
//!
//! Whether a failure is worth another task-level attempt is decided from the
//! variant and its status fields, never from the rendered message.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input, e.g. an empty model id.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("API key is required. Set WAVESPEED_API_KEY or pass an API key to the client")]
    MissingCredential,

    /// Network-layer failures on every attempt of a single exchange.
    #[error("Connection failed after {attempts} attempts: {source}")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The service answered 200 but the JSON envelope reports a failure code.
    #[error("API error (code {code}): {message}")]
    Api { code: u16, message: String },

    #[error("Submission accepted but the response carries no task id")]
    MissingTaskId,

    #[error("Unexpected response from the service: {0}")]
    Protocol(String),

    #[error("Prediction timed out after {:.2}s{}", .timeout.as_secs_f64(), format_task_id(.task_id))]
    DeadlineExceeded {
        task_id: Option<String>,
        timeout: Duration,
    },

    #[error("Prediction failed (task_id: {task_id}): {message}")]
    TaskFailed { task_id: String, message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be built or sent for a non-network reason.
    #[error("Request error: {0}")]
    Request(#[source] reqwest::Error),
}

fn format_task_id(task_id: &Option<String>) -> String {
    match task_id {
        Some(id) => format!(" (task_id: {})", id),
        None => String::new(),
    }
}

/// 5xx and 429 are the only statuses worth a fresh attempt.
fn is_transient_status(status: u16) -> bool {
    StatusCode::from_u16(status)
        .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
        .unwrap_or(false)
}

impl Error {
    /// Returns true when the outer task-retry loop may start a fresh attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ConnectionExhausted { .. } => true,
            Error::HttpStatus { status, .. } => is_transient_status(*status),
            Error::Api { code, .. } => is_transient_status(*code),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remote task id carried by the error, if one had been assigned.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Error::TaskFailed { task_id, .. } => Some(task_id),
            Error::DeadlineExceeded { task_id, .. } => task_id.as_deref(),
            _ => None,
        }
    }
}
