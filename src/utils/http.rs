//! Paced outbound HTTP client.
//!
//! Every external catalog and PDF host is reached through [`PacedClient`],
//! which enforces a minimum spacing between requests on the same instance,
//! applies a per-request deadline, and retries a bounded number of times.
//! Non-2xx responses capture a truncated body snippet for diagnostics.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Maximum number of body bytes captured into an error snippet.
const BODY_SNIPPET_LIMIT: usize = 1024;

/// Outbound request failure, after all retries are exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}: {snippet}")]
    Status {
        url: String,
        status: u16,
        snippet: String,
    },

    #[error("{url} returned a 2xx response that was not valid JSON")]
    NotJson { url: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pacing and retry parameters for one client instance.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// Per-request deadline.
    pub timeout: Duration,
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Sleep between attempts.
    pub retry_delay: Duration,
    /// Minimum spacing between requests issued by this instance.
    pub min_spacing: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_millis(500),
            min_spacing: Duration::from_millis(200),
        }
    }
}

/// A downloaded binary payload.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// URL after redirects, used to resolve relative links on landing pages.
    pub final_url: String,
}

/// HTTP client with per-instance request pacing.
///
/// `last_request_at` is shared by all concurrent callers of the instance and
/// updated under a lock, so the spacing holds across tasks.
#[derive(Debug)]
pub struct PacedClient {
    client: Client,
    config: FetchConfig,
    last_request_at: Mutex<Option<Instant>>,
}

impl PacedClient {
    pub fn new(config: FetchConfig, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            config,
            last_request_at: Mutex::new(None),
        })
    }

    /// Sleep until `min_spacing` has elapsed since the previous request, then
    /// stamp the post-sleep instant.
    async fn pace(&self) {
        let mut last = self.last_request_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_spacing {
                tokio::time::sleep(self.config.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<reqwest::Response, FetchError> {
        self.pace().await;

        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone());
        if let Some(bytes) = body {
            request = request.body(bytes.to_vec());
        }

        let response = request.send().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let snippet = response
                .text()
                .await
                .map(|t| truncate_snippet(&t))
                .unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                snippet,
            });
        }

        Ok(response)
    }

    /// Issue a request with retries. Network errors and non-2xx statuses are
    /// retried; everything else is returned to the caller.
    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(&method, url, headers, body).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    attempt += 1;
                    if attempt > self.config.retries {
                        return Err(error);
                    }
                    tracing::debug!(url, attempt, %error, "retrying after transient failure");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// GET a JSON document.
    pub async fn get_json(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, FetchError> {
        let headers = build_headers(extra_headers);
        let response = self
            .request_with_retry(Method::GET, url, &headers, None)
            .await?;
        let text = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|_| FetchError::NotJson {
            url: url.to_string(),
        })
    }

    /// GET a text body (HTML pages, XML feeds).
    pub async fn get_text(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        let headers = build_headers(extra_headers);
        let response = self
            .request_with_retry(Method::GET, url, &headers, None)
            .await?;
        response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET raw bytes plus content-type and the post-redirect URL.
    pub async fn get_bytes(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchedBytes, FetchError> {
        let headers = build_headers(extra_headers);
        let response = self
            .request_with_retry(Method::GET, url, &headers, None)
            .await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let final_url = response.url().to_string();
        let bytes = response.bytes().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
            final_url,
        })
    }

    /// POST a binary body and return the response text.
    pub async fn post_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, FetchError> {
        let headers = build_headers(&[("content-type", content_type)]);
        let response = self
            .request_with_retry(Method::POST, url, &headers, Some(&body))
            .await?;
        response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn build_headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

fn truncate_snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LIMIT {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
