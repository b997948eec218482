//! HTTP Client - Pooled, Concurrency-capped REST Client
//!
//! Wraps reqwest with a semaphore, an optional `governor` rate limit and
//! failure classification into `FetchError`. No retries: callers that
//! want fallback (the price cascade) move on to the next source instead.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Configuration for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Per-request timeout.
  pub timeout: Duration,
  /// Maximum concurrent in-flight requests.
  pub max_concurrent: usize,
  /// User-Agent header (some feeds reject the default).
  pub user_agent: String,
}

impl Default for HttpClientConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
      max_concurrent: 16,
      user_agent: concat!("market-aggregator/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// Cheaply cloneable HTTP client. Clones share the connection pool and
/// the concurrency cap.
#[derive(Clone)]
pub struct HttpClient {
  /// Underlying HTTP client.
  http: Client,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Outbound rate limit, if this clone has one.
  limiter: Option<Arc<DefaultDirectRateLimiter>>,
  /// Timeout reported in `FetchError::Timeout`.
  timeout: Duration,
}

impl HttpClient {
  /// Create a new client.
  pub fn new(config: &HttpClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .user_agent(config.user_agent.clone())
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
      limiter: None,
      timeout: config.timeout,
    })
  }

  /// A clone of this client that waits for a `governor` permit before
  /// every request. `0` disables limiting.
  #[must_use]
  pub fn with_rate_limit(&self, requests_per_minute: u32) -> Self {
    let limiter = NonZeroU32::new(requests_per_minute)
      .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));
    Self {
      limiter,
      ..self.clone()
    }
  }

  /// GET `url` with query parameters and return the raw body.
  ///
  /// Non-2xx statuses map to `FetchError::Status`.
  pub async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
    if let Some(limiter) = &self.limiter {
      limiter.until_ready().await;
    }

    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|_| FetchError::Network("HTTP client semaphore closed".to_string()))?;

    debug!(url, "GET");

    let response = self
      .http
      .get(url)
      .query(query)
      .send()
      .await
      .map_err(|e| self.classify(&e))?;

    let status = response.status();
    if !status.is_success() {
      warn!(url, status = status.as_u16(), "Non-success HTTP status");
      return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.bytes().await.map_err(|e| self.classify(&e))?;
    Ok(body.to_vec())
  }

  /// Map a reqwest failure onto the fetch taxonomy.
  fn classify(&self, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
      FetchError::Timeout(self.timeout)
    } else if e.is_decode() || e.is_body() {
      FetchError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
      FetchError::Status(status.as_u16())
    } else {
      FetchError::Network(e.to_string())
    }
  }
}
