use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tipflow_breaker::CircuitBreaker;
use tipflow_config::UpstreamConfig;
use tracing::warn;

use crate::error::TransportError;

#[derive(Debug)]
pub enum UpstreamError {
    /// The circuit breaker denied the attempt before any network I/O
    /// happened.
    CircuitOpen,
    /// The path couldn't be resolved against `base_url`/`media_service_url`.
    InvalidUrl(url::ParseError),
    Transport(TransportError),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::CircuitOpen => write!(f, "circuit breaker is open"),
            UpstreamError::InvalidUrl(e) => write!(f, "invalid upstream url: {e}"),
            UpstreamError::Transport(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for UpstreamError {}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
    pub body_bytes: Vec<u8>,
    pub attempts: u32,
}

/// D. UpstreamClient: HTTP client with bounded exponential-backoff
/// retries. Ported from
/// `original_source/processors/base_processor.py:APIClient.make_request`.
pub struct UpstreamClient {
    http: Client,
    breaker: Arc<CircuitBreaker>,
    base_url: Url,
    media_service_url: Url,
    namespace: String,
    token: String,
    max_retries: u32,
    backoff_factor: f64,
    max_backoff: Duration,
    request_timeout: Duration,
    attachment_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, url::ParseError> {
        Ok(UpstreamClient {
            http: Client::new(),
            breaker,
            base_url: Url::parse(&config.base_url)?,
            media_service_url: Url::parse(&config.media_service_url)?,
            namespace: config.namespace.clone(),
            token: config.token.clone(),
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            max_backoff: Duration::from_secs_f64(config.max_backoff_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            attachment_timeout: Duration::from_secs(config.attachment_timeout_secs),
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Fetch a JSON record payload; `path` is resolved against `base_url`.
    pub async fn get_json(&self, path: &str, tip: &str) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.base_url.join(path).map_err(UpstreamError::InvalidUrl)?;
        self.get(url, tip, self.request_timeout).await
    }

    /// Fetch a binary attachment; `path` is resolved against
    /// `media_service_url` and the longer attachment timeout is used.
    pub async fn get_attachment(&self, path: &str, tip: &str) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.media_service_url.join(path).map_err(UpstreamError::InvalidUrl)?;
        self.get(url, tip, self.attachment_timeout).await
    }

    async fn get(&self, url: Url, tip: &str, timeout: Duration) -> Result<UpstreamResponse, UpstreamError> {
        self.breaker.before_request().map_err(|_| UpstreamError::CircuitOpen)?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self
                .http
                .get(url.clone())
                .header("en-namespace", &self.namespace)
                .header("Authorization", format!("Bearer {}", self.token))
                .timeout(timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body_bytes = response.bytes().await.unwrap_or_default().to_vec();
                    let body = String::from_utf8_lossy(&body_bytes).into_owned();
                    return Ok(UpstreamResponse { status, body, body_bytes, attempts: attempt });
                }
                Err(source) => {
                    let is_connect_or_timeout = source.is_connect() || source.is_timeout();
                    if attempt > self.max_retries {
                        return Err(UpstreamError::Transport(TransportError {
                            attempts: attempt,
                            source,
                        }));
                    }

                    let wait = if is_connect_or_timeout {
                        // min(backoff_factor^attempt * backoff_factor, max_backoff)
                        let computed = self.backoff_factor.powi(attempt as i32) * self.backoff_factor;
                        Duration::from_secs_f64(computed.min(self.max_backoff.as_secs_f64()))
                    } else {
                        // Generic request failures (DNS, TLS): flat delay.
                        Duration::from_secs_f64(self.backoff_factor)
                    };

                    warn!(tip, attempt, ?wait, "upstream request failed, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("namespace", &self.namespace)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
