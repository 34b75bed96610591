//! Wire shapes of the prediction API and the normalized run result.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Envelope code the service uses for success.
pub const API_OK: u16 = 200;

/// JSON envelope wrapping every response body: `{code, message, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Decodes a response body and unwraps `data`, rejecting failure codes.
    pub fn decode(body: &[u8]) -> Result<T> {
        let response: ApiResponse<T> = serde_json::from_slice(body)
            .map_err(|e| Error::Protocol(format!("invalid response body: {}", e)))?;

        if let Some(code) = response.code.filter(|code| *code != API_OK) {
            return Err(Error::Api {
                code,
                message: response.message.unwrap_or_default(),
            });
        }

        response
            .data
            .ok_or_else(|| Error::Protocol("response has no data field".to_string()))
    }
}

/// Remote task as reported by submit and poll responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Prediction {
    /// The task id, if present and non-empty.
    pub fn task_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Parses the status field; a missing or unknown status is a protocol error.
    pub fn state(&self) -> Result<TaskState> {
        let status = self
            .status
            .as_deref()
            .ok_or_else(|| Error::Protocol("missing status in response".to_string()))?;
        status.parse()
    }

    /// Service-supplied error text, defaulting to "Unknown error".
    pub fn error_message(&self) -> String {
        match self.error.as_deref() {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => "Unknown error".to_string(),
        }
    }

    pub fn into_result(self) -> RunResult {
        RunResult {
            task_id: self.task_id().map(str::to_string),
            outputs: self.outputs.unwrap_or_default(),
        }
    }
}

/// Lifecycle of a remote task. Only `Processing` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Processing)
    }
}

impl FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processing" => Ok(TaskState::Processing),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            other => Err(Error::Protocol(format!("unknown task status {:?}", other))),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outputs of a successful run, in the order the service returned them.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunResult {
    /// Remote task id; absent when a sync response omitted it.
    pub task_id: Option<String>,
    pub outputs: Vec<Value>,
}

/// `data` section of an upload response.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadData {
    #[serde(default)]
    pub download_url: Option<String>,
}
