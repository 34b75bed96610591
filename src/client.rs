//! Runs a model to completion: submit, then either take the synchronous
//! result or poll the task until it reaches a terminal state.

use std::path::Path;

use log::{debug, info, warn};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, EffectiveRun, RunOptions, UploadOptions};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::http::{ExchangeRequest, HttpTransport, RequestBody, Transport};
use crate::prediction::{ApiResponse, Prediction, RunResult, TaskState, UploadData};
use crate::retry::RetryPolicy;

/// Field injected into the request body to ask for a synchronous result.
const SYNC_MODE_FIELD: &str = "enable_sync_mode";

/// What a successful submission produced.
#[derive(Debug)]
enum Submission {
    /// Async mode: the task was accepted and must be polled.
    Accepted(String),
    /// Sync mode: the service returned the terminal result directly.
    Finished(RunResult),
}

/// Client for the prediction API.
///
/// Holds only immutable configuration, so one instance can serve concurrent
/// callers.
pub struct Client<T = HttpTransport> {
    config: ClientConfig,
    api_root: String,
    transport: T,
}

impl Client<HttpTransport> {
    /// Creates a client that talks to the service over HTTP.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a client configured from the `WAVESPEED_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let api_root = config.api_root();
        Self {
            config,
            api_root,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs `model` on `input` and waits for its outputs.
    pub async fn run(
        &self,
        model: &str,
        input: &Map<String, Value>,
        options: &RunOptions,
    ) -> Result<RunResult> {
        self.run_with_cancel(model, input, options, CancellationToken::new())
            .await
    }

    /// Like [`Client::run`], but aborts promptly with `Error::Cancelled` once
    /// `cancel` fires.
    #[tracing::instrument(skip(self, input, options, cancel))]
    pub async fn run_with_cancel(
        &self,
        model: &str,
        input: &Map<String, Value>,
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        if model.is_empty() {
            return Err(Error::InvalidArgument("model id is required".to_string()));
        }
        if self.config.api_key.is_empty() {
            return Err(Error::MissingCredential);
        }

        let run = options.resolve(&self.config);
        let deadline = Deadline::new(run.timeout, cancel);
        let policy = RetryPolicy::new(run.task_retries, self.config.retry_interval);
        let total = policy.total_attempts();

        let mut attempt = 0;
        loop {
            let err = match self.run_once(model, input, &run, &deadline).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= run.task_retries {
                return Err(err);
            }

            attempt += 1;
            let delay = policy.delay(attempt);
            warn!(
                "Task attempt {}/{} failed: {}. Retrying in {:.1}s...",
                attempt,
                total,
                err,
                delay.as_secs_f64()
            );
            deadline.sleep(delay).await?;
        }
    }

    /// One full attempt: a fresh submission and, in async mode, a fresh poll loop.
    async fn run_once(
        &self,
        model: &str,
        input: &Map<String, Value>,
        run: &EffectiveRun,
        deadline: &Deadline,
    ) -> Result<RunResult> {
        match self.submit(model, input, run, deadline).await? {
            Submission::Finished(result) => Ok(result),
            Submission::Accepted(task_id) => self.wait(&task_id, run, deadline).await,
        }
    }

    async fn submit(
        &self,
        model: &str,
        input: &Map<String, Value>,
        run: &EffectiveRun,
        deadline: &Deadline,
    ) -> Result<Submission> {
        let mut body = input.clone();
        if run.sync {
            body.insert(SYNC_MODE_FIELD.to_string(), Value::Bool(true));
        }

        let url = format!("{}/{}", self.api_root, model);
        debug!("Submitting task for model {} (sync: {})", model, run.sync);

        let request = ExchangeRequest::post(url, RequestBody::Json(Value::Object(body)), run.exchange_timeout);
        let response = self.transport.exchange(request, deadline).await?;
        let prediction: Prediction = ApiResponse::decode(&response)?;

        if run.sync {
            return finish_sync(prediction).map(Submission::Finished);
        }

        let task_id = prediction.task_id().ok_or(Error::MissingTaskId)?;
        info!("Task {} submitted for model {}", task_id, model);
        Ok(Submission::Accepted(task_id.to_string()))
    }

    /// Polls `task_id` until it completes, fails, or the deadline passes.
    async fn wait(&self, task_id: &str, run: &EffectiveRun, deadline: &Deadline) -> Result<RunResult> {
        loop {
            deadline.check(Some(task_id))?;

            let prediction = self.fetch(task_id, run, deadline).await?;
            let state = prediction.state()?;
            if !state.is_terminal() {
                debug!(
                    "Task {} {} after {:.1}s",
                    task_id,
                    state,
                    deadline.elapsed().as_secs_f64()
                );
                deadline.sleep(run.poll_interval).await?;
                continue;
            }

            debug!("Task {} {}", task_id, state);
            return match state {
                TaskState::Failed => Err(Error::TaskFailed {
                    task_id: task_id.to_string(),
                    message: prediction.error_message(),
                }),
                _ => Ok(RunResult {
                    task_id: Some(task_id.to_string()),
                    outputs: prediction.outputs.unwrap_or_default(),
                }),
            };
        }
    }

    async fn fetch(&self, task_id: &str, run: &EffectiveRun, deadline: &Deadline) -> Result<Prediction> {
        let url = format!("{}/predictions/{}/result", self.api_root, task_id);
        let request = ExchangeRequest::get(url, run.exchange_timeout).for_task(task_id);
        let response = self.transport.exchange(request, deadline).await?;
        ApiResponse::decode(&response)
    }

    /// Uploads a local file and returns its download URL.
    #[tracing::instrument(skip(self, options))]
    pub async fn upload(&self, path: &Path, options: &UploadOptions) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(Error::MissingCredential);
        }
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("file path is required".to_string()));
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        debug!("Uploading {} ({} bytes)", path.display(), bytes.len());

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let deadline = Deadline::new(timeout, CancellationToken::new());
        let url = format!("{}/media/upload/binary", self.api_root);
        let request = ExchangeRequest::post(url, RequestBody::File { file_name, bytes }, timeout);

        let response = self.transport.exchange(request, &deadline).await?;
        let data: UploadData = ApiResponse::decode(&response)?;

        data.download_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::Protocol("no download_url in upload response".to_string()))
    }
}

/// Normalizes a synchronous submit response into the same contract as a
/// polled result.
fn finish_sync(prediction: Prediction) -> Result<RunResult> {
    match prediction.state()? {
        TaskState::Completed => Ok(prediction.into_result()),
        TaskState::Failed | TaskState::Processing => Err(Error::TaskFailed {
            task_id: prediction.task_id().unwrap_or("unknown").to_string(),
            message: prediction.error_message(),
        }),
    }
}
