use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Map, Value};
use wavespeed::config::{ENV_API_KEY, ENV_BASE_URL};
use wavespeed::{Client, ClientConfig, RunOptions, UploadOptions};

/// wavespeed - run models on the WaveSpeed API
///
/// The API key is read from WAVESPEED_API_KEY unless --api-key is given.
///
/// Examples:
///   wavespeed run wavespeed-ai/z-image/turbo --input '{"prompt": "Cat"}'
///   wavespeed upload ./cat.png
#[derive(Parser, Debug)]
#[command(author, version = env!("WAVESPEED_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API key (also via WAVESPEED_API_KEY)
    #[arg(long = "api-key", env = ENV_API_KEY, hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// API base URL (defaults to https://api.wavespeed.ai; also via WAVESPEED_BASE_URL)
    #[arg(long = "base-url", env = ENV_BASE_URL, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Connection-level retries per HTTP request
    #[arg(long = "connection-retries", value_name = "N", global = true)]
    pub connection_retries: Option<u32>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a model and print its outputs, one per line
    Run(RunArgs),

    /// Upload a file and print its download URL
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Model identifier, e.g. "wavespeed-ai/z-image/turbo"
    #[arg(value_name = "MODEL")]
    pub model: String,

    /// Input document as a JSON object
    #[arg(long, short = 'i', value_name = "JSON", default_value = "{}")]
    pub input: String,

    /// Overall timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Poll interval in seconds
    #[arg(long = "poll-interval", value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Ask the service to return the result in the submit response
    #[arg(long)]
    pub sync: bool,

    /// Task-level retries on transient failures
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// File to upload
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Upload timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,
}

fn seconds(value: Option<f64>, flag: &str) -> Result<Option<Duration>> {
    match value.map(Duration::try_from_secs_f64) {
        None => Ok(None),
        Some(Ok(duration)) => Ok(Some(duration)),
        Some(Err(_)) => bail!(
            "--{} must be a non-negative number of seconds, got {}",
            flag,
            value.unwrap_or_default()
        ),
    }
}

fn parse_input(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--input must be a JSON object"),
    }
}

fn build_config(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(retries) = cli.connection_retries {
        config.max_connection_retries = retries;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let client = Client::new(build_config(&cli))?;

    match cli.command {
        Commands::Run(args) => {
            let input = parse_input(&args.input)?;
            let options = RunOptions {
                timeout: seconds(args.timeout, "timeout")?,
                poll_interval: seconds(args.poll_interval, "poll-interval")?,
                enable_sync_mode: Some(args.sync),
                max_retries: args.max_retries,
            };
            let result = client
                .run(&args.model, &input, &options)
                .await
                .with_context(|| format!("Failed to run {}", args.model))?;
            for output in &result.outputs {
                match output {
                    Value::String(s) => println!("{}", s),
                    other => println!("{}", other),
                }
            }
        }
        Commands::Upload(args) => {
            let options = UploadOptions {
                timeout: seconds(args.timeout, "timeout")?,
            };
            let url = client
                .upload(&args.file, &options)
                .await
                .with_context(|| format!("Failed to upload {}", args.file.display()))?;
            println!("{}", url);
        }
    }
    Ok(())
}
