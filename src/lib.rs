//! Client for the WaveSpeed prediction API.
//!
//! A [`Client`] submits a model run and either receives the result directly
//! (sync mode) or polls the remote task until it completes. Network failures
//! are retried per exchange; transient task failures (5xx, 429, exhausted
//! connection retries) restart the whole submission.

pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod http;
pub mod prediction;
pub mod retry;

pub use client::Client;
pub use config::{ClientConfig, RunOptions, UploadOptions};
pub use error::{Error, Result};
pub use prediction::{RunResult, TaskState};
pub use tokio_util::sync::CancellationToken;
