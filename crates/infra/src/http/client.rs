use std::time::Duration;

use calsync_domain::constants::{
    DEFAULT_REMOTE_BASE_BACKOFF_MS, DEFAULT_REMOTE_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use calsync_domain::{CalSyncError, GoogleConfig};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Upper bound on the backoff exponent so a misconfigured attempt count cannot
/// sleep for hours.
const MAX_BACKOFF_SHIFT: u32 = 8;

/// How many times a request is attempted and how long to wait in between.
///
/// Retry `n` (1-based) waits `base_backoff * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_REMOTE_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_REMOTE_BASE_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn delay_before(&self, retry: usize) -> Duration {
        let shift = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(MAX_BACKOFF_SHIFT);
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    fn allows_retry_after(&self, attempt: usize) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

/// HTTP client shared by the Google adapters.
///
/// Server errors (5xx) and timeout/connect failures are retried according to
/// the [`RetryPolicy`]. Once the attempts are spent the last response (or
/// error) goes back to the caller, which owns status classification.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn new() -> Result<Self, CalSyncError> {
        Self::builder().build()
    }

    /// Client tuned from the `[google]` configuration section.
    pub fn from_config(config: &GoogleConfig) -> Result<Self, CalSyncError> {
        Self::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .max_attempts(config.max_attempts)
            .base_backoff(Duration::from_millis(config.base_backoff_ms))
            .user_agent(concat!("calsync/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send `builder`, retrying transient failures.
    ///
    /// The body must be cloneable (JSON and form bodies are).
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, CalSyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = builder
                .try_clone()
                .ok_or_else(|| CalSyncError::Internal("streaming request bodies cannot be retried".into()))?
                .build()
                .map_err(|err| CalSyncError::from(InfraError::from(err)))?;
            let (method, url) = (request.method().clone(), request.url().clone());

            let outcome = self.client.execute(request).await;
            let retryable = match &outcome {
                Ok(response) => {
                    debug!(attempt, %method, %url, status = %response.status(), "remote responded");
                    response.status().is_server_error()
                }
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "remote request failed");
                    is_transient(err)
                }
            };

            if !retryable || !self.retry.allows_retry_after(attempt) {
                return outcome.map_err(|err| CalSyncError::from(InfraError::from(err)));
            }

            let delay = self.retry.delay_before(attempt);
            warn!(attempt, %method, %url, delay_ms = delay.as_millis(), "retrying remote call");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    retry: RetryPolicy,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts, the initial try included. Values below 1 become 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.retry.base_backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient, CalSyncError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(|err| CalSyncError::from(InfraError::from(err)))?;

        Ok(HttpClient { client, retry: self.retry })
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::{Method, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn quick_client(attempts: usize) -> HttpClient {
        HttpClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_attempts(attempts)
            .build()
            .expect("http client")
    }

    #[tokio::test]
    async fn flaky_endpoint_recovers_within_budget() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(502)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let client = quick_client(3);
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_returned_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;

        let client = quick_client(3);
        let response = client
            .send(client.request(Method::POST, server.uri()).json(&serde_json::json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn returns_last_server_error_once_attempts_are_spent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = quick_client(3);
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn single_attempt_budget_never_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = quick_client(0);
        assert_eq!(client.retry_policy().max_attempts, 1);
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy { max_attempts: 4, base_backoff: Duration::from_millis(500) };

        assert_eq!(policy.delay_before(1), Duration::from_millis(500));
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(40), Duration::from_millis(500 * 256));
    }

    #[tokio::test]
    async fn refused_connection_surfaces_as_network_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let client = quick_client(2);

        let result = client.send(client.request(Method::GET, format!("http://{addr}"))).await;

        assert!(matches!(result, Err(CalSyncError::Network(_))), "got {result:?}");
    }
}
