//! Retrying JSON Transport
//!
//! Thin wrapper around `reqwest::Client` shared by every remote collaborator
//! (work-item API, source ledger lookup). It owns the API base URL, the
//! bearer token obtained at login, and the retry policy for transient
//! failures.
//!
//! Only network errors and 5xx responses are retried; 4xx and other logical
//! failures are returned to the caller untouched. The retry loop is an
//! explicit bounded loop so tests can inject a collapsed policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Transport-level errors. Anything that reaches the caller as a typed HTTP
/// response (including 4xx) is NOT an `HttpError`.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request kept failing after exhausting the retry budget.
    #[error("request to {url} failed after {attempts} attempt(s): {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The path could not be joined onto the base URL.
    #[error("invalid request path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client itself could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Retry settings for transient failures.
///
/// Defaults match the production contract: 3 attempts, 5s base delay with
/// exponential growth capped at 60s, 10s per-request timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry, capped at `max_delay`.
    /// `attempt` is zero-based: the delay after the first failure is
    /// `base_delay`, then doubles.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// JSON transport bound to one API base URL.
///
/// Cloning is cheap and clones share the bearer token, so one login covers
/// every client built on the same transport.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    policy: RetryPolicy,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpClient {
    /// Creates a transport with the default retry policy.
    pub fn new(base_url: Url) -> Result<Self, HttpError> {
        Self::with_policy(base_url, RetryPolicy::default())
    }

    /// Creates a transport with an explicit retry policy (used by tests to
    /// collapse the backoff delays).
    pub fn with_policy(mut base_url: Url, policy: RetryPolicy) -> Result<Self, HttpError> {
        // Relative joins silently drop the last path segment without a
        // trailing slash.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .map_err(HttpError::Build)?;

        Ok(Self {
            client,
            base_url,
            policy,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Stores the bearer token attached to every subsequent request.
    pub async fn set_bearer_token(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn join(&self, path: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| HttpError::InvalidPath {
                path: path.to_string(),
                source,
            })
    }

    pub async fn get(&self, path: &str) -> Result<Response, HttpError> {
        let url = self.join(path)?;
        self.execute(Method::GET, url, None).await
    }

    /// GET with query parameters appended to the joined URL.
    pub async fn get_query(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, HttpError> {
        let mut url = self.join(path)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        self.execute(Method::GET, url, None).await
    }

    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, HttpError> {
        let url = self.join(path)?;
        let body = serde_json::to_value(body).expect("request body serialization");
        self.execute(Method::POST, url, Some(body)).await
    }

    pub async fn put_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, HttpError> {
        let url = self.join(path)?;
        let body = serde_json::to_value(body).expect("request body serialization");
        self.execute(Method::PUT, url, Some(body)).await
    }

    /// PUT without a request body (claim endpoints).
    pub async fn put(&self, path: &str) -> Result<Response, HttpError> {
        let url = self.join(path)?;
        self.execute(Method::PUT, url, None).await
    }

    /// Sends the request, retrying network errors and 5xx responses with
    /// capped exponential backoff. Any other response is returned as-is.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<Response, HttpError> {
        let token = self.token.read().await.clone();
        let mut last_reason = String::new();

        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                tracing::debug!(%url, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_reason = format!("server error {}", response.status());
                    tracing::warn!(%url, status = %response.status(), "transient server error");
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    last_reason = err.to_string();
                    tracing::warn!(%url, error = %err, "request failed");
                }
            }
        }

        Err(HttpError::Transport {
            url: url.to_string(),
            attempts: self.policy.attempts,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = Url::parse("http://localhost:3001/api/v1").unwrap();
        let client = HttpClient::new(url).unwrap();
        assert_eq!(client.base_url().path(), "/api/v1/");
    }
}
