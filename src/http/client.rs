//! reqwest-backed transport with connection-level retry.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};

use super::exchange::{ExchangeRequest, RequestBody, Transport};
use crate::config::ClientConfig;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::retry::{AttemptError, RetryPolicy, with_connection_retry};

const USER_AGENT: &str = concat!("wavespeed-rust/", env!("CARGO_PKG_VERSION"));

/// Sends requests through a shared reqwest client carrying the bearer credential.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    /// Builds a transport that authenticates every request with `config.api_key`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::MissingCredential);
        }

        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| Error::InvalidArgument("API key contains invalid characters".to_string()))?;
        auth_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_value);
        debug!("Using API key for authentication: {}", mask_key(&config.api_key));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(Error::Request)?;

        Ok(Self::with_client(
            client,
            RetryPolicy::new(config.max_connection_retries, config.retry_interval),
        ))
    }

    /// Wraps an already configured reqwest client.
    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    fn build(&self, request: &ExchangeRequest, deadline: &Deadline) -> RequestBuilder {
        let builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .timeout(deadline.cap(request.timeout));

        match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::File { file_name, bytes }) => {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                builder.multipart(Form::new().part("file", part))
            }
            None => builder,
        }
    }

    /// Single attempt without retry.
    async fn attempt(
        &self,
        request: &ExchangeRequest,
        deadline: &Deadline,
    ) -> std::result::Result<Vec<u8>, AttemptError> {
        deadline.check(request.task_id.as_deref())?;

        let builder = self.build(request, deadline);
        let outcome = tokio::select! {
            _ = deadline.cancel_token().cancelled() => return Err(Error::Cancelled.into()),
            outcome = send_and_read(builder) => outcome,
        };

        match outcome {
            Ok(body) => Ok(body),
            Err(AttemptError::Connection(e)) if e.is_builder() => {
                Err(AttemptError::Fatal(Error::Request(e)))
            }
            // The attempt was cut short by the call deadline; retrying cannot help.
            Err(AttemptError::Connection(_)) if deadline.is_expired() => {
                Err(deadline.exceeded(request.task_id.as_deref()).into())
            }
            Err(e) => Err(e),
        }
    }
}

async fn send_and_read(builder: RequestBuilder) -> std::result::Result<Vec<u8>, AttemptError> {
    let response = builder.send().await.map_err(AttemptError::Connection)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let body = response.bytes().await.map_err(AttemptError::Connection)?;
    Ok(body.to_vec())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, deadline))]
    async fn exchange(&self, request: ExchangeRequest, deadline: &Deadline) -> Result<Vec<u8>> {
        debug!("{} {}...", request.method, request.url);
        let operation_name = format!("{} {}", request.method, request.url);
        with_connection_retry(&self.policy, deadline, &operation_name, || {
            self.attempt(&request, deadline)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn config(max_connection_retries: u32) -> ClientConfig {
        ClientConfig {
            max_connection_retries,
            retry_interval: Duration::from_millis(10),
            ..ClientConfig::new("test-key-1234567890")
        }
    }

    fn deadline() -> Deadline {
        Deadline::new(Duration::from_secs(30), CancellationToken::new())
    }

    /// An address nothing listens on.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = HttpTransport::new(&ClientConfig::default());
        assert!(matches!(result, Err(Error::MissingCredential)));
    }

    #[test]
    fn test_new_rejects_unprintable_api_key() {
        let result = HttpTransport::new(&ClientConfig::new("bad\nkey"));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key("abcd1234567890wxyz"), "abcd*********wxyz");
    }

    #[tokio::test]
    async fn test_exchange_sends_bearer_token_and_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/some/model")
            .match_header("authorization", "Bearer test-key-1234567890")
            .match_body(Matcher::Json(json!({"prompt": "cat"})))
            .with_status(200)
            .with_body(r#"{"code":200}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&config(0)).unwrap();
        let request = ExchangeRequest::post(
            format!("{}/api/v3/some/model", server.url()),
            RequestBody::Json(json!({"prompt": "cat"})),
            Duration::from_secs(5),
        );
        let body = transport.exchange(request, &deadline()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body, br#"{"code":200}"#);
    }

    #[tokio::test]
    async fn test_exchange_does_not_retry_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/status")
            .with_status(503)
            .with_body("service unavailable")
            .expect(1)
            .create_async()
            .await;

        let transport = HttpTransport::new(&config(3)).unwrap();
        let request = ExchangeRequest::get(format!("{}/status", server.url()), Duration::from_secs(5));
        let err = transport.exchange(request, &deadline()).await.unwrap_err();

        mock.assert_async().await;
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "service unavailable");
            }
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_surfaces_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not found")
            .expect(1)
            .create_async()
            .await;

        let transport = HttpTransport::new(&config(3)).unwrap();
        let request = ExchangeRequest::get(format!("{}/missing", server.url()), Duration::from_secs(5));
        let err = transport.exchange(request, &deadline()).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_exchange_uploads_multipart_file_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file""#.to_string()),
                Matcher::Regex(r#"filename="cat.png""#.to_string()),
                Matcher::Regex("pixels".to_string()),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let transport = HttpTransport::new(&config(0)).unwrap();
        let request = ExchangeRequest::post(
            format!("{}/upload", server.url()),
            RequestBody::File {
                file_name: "cat.png".to_string(),
                bytes: b"pixels".to_vec(),
            },
            Duration::from_secs(5),
        );
        transport.exchange(request, &deadline()).await.unwrap();

        mock.assert_async().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_exchange_exhausts_connection_retries_on_refused_connection() {
        let transport = HttpTransport::new(&config(2)).unwrap();
        let request = ExchangeRequest::get(format!("{}/x", closed_port_url()), Duration::from_secs(2));

        let start = Instant::now();
        let err = transport.exchange(request, &deadline()).await.unwrap_err();

        assert!(matches!(err, Error::ConnectionExhausted { attempts: 3, .. }));
        assert!(err.is_transient());
        // 10ms + 20ms of back-off between the three attempts.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_exchange_retries_request_timeouts() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/slow", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicU32::new(0));
        let accepted_clone = Arc::clone(&accepted);
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                accepted_clone.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let transport = HttpTransport::new(&config(2)).unwrap();
        let request = ExchangeRequest::get(url, Duration::from_millis(100));
        let err = transport.exchange(request, &deadline()).await.unwrap_err();
        server.abort();

        assert!(matches!(err, Error::ConnectionExhausted { attempts: 3, .. }));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exchange_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let deadline = Deadline::new(Duration::from_secs(30), token);

        let transport = HttpTransport::new(&config(5)).unwrap();
        let request = ExchangeRequest::get(closed_port_url(), Duration::from_secs(2));
        let err = transport.exchange(request, &deadline).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_exchange_after_deadline_reports_task() {
        let deadline = Deadline::new(Duration::ZERO, CancellationToken::new());
        let transport = HttpTransport::new(&config(5)).unwrap();
        let request =
            ExchangeRequest::get(closed_port_url(), Duration::from_secs(2)).for_task("task-9");
        let err = transport.exchange(request, &deadline).await.unwrap_err();

        assert_eq!(err.task_id(), Some("task-9"));
        assert!(matches!(err, Error::DeadlineExceeded { .. }));
    }
}
