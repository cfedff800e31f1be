//! Outbound HTTP abstraction
//!
//! The engine only depends on the `Fetcher` trait. `HttpFetcher` is the
//! reqwest-backed implementation used by the binary; tests plug in an
//! in-memory fetcher instead.

use crate::error::{ScrapeError, ScrapeResult};
use crate::types::SourceRequest;
use async_trait::async_trait;
use futures::future::{select_ok, BoxFuture, FutureExt};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// User-Agent sent with every request
const USER_AGENT: &str = concat!("metascrape/", env!("CARGO_PKG_VERSION"));

/// Pause between retry attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Generic HTTP GET
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return the response body
    ///
    /// Non-success statuses are errors. `max_retries` counts additional
    /// attempts after the first; `timeout` bounds each attempt.
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        max_retries: u32,
        timeout: Duration,
    ) -> ScrapeResult<String>;

    /// Fetch an adapter request
    async fn fetch(&self, request: &SourceRequest) -> ScrapeResult<String> {
        self.get(
            &request.url,
            &request.headers,
            request.max_retries,
            request.timeout,
        )
        .await
    }
}

/// Race several requests and return the first successful body
///
/// The losing requests are dropped (and thereby cancelled) as soon as one
/// succeeds. When every request fails the last error is returned.
pub async fn race_first_success(
    fetcher: &dyn Fetcher,
    requests: &[SourceRequest],
) -> ScrapeResult<String> {
    if requests.is_empty() {
        return Err(ScrapeError::InvalidRequest("No request to race".to_string()));
    }
    let attempts: Vec<BoxFuture<'_, ScrapeResult<String>>> = requests
        .iter()
        .map(|request| fetcher.fetch(request).boxed())
        .collect();

    let (body, _losers) = select_ok(attempts).await?;
    Ok(body)
}

/// reqwest-backed fetcher with a global request quota
pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpFetcher {
    /// Create a fetcher allowing `requests_per_second` outbound requests
    pub fn new(requests_per_second: u32) -> ScrapeResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ScrapeError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn get_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> ScrapeResult<String> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout(timeout.as_millis() as u64)
            } else {
                ScrapeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout(timeout.as_millis() as u64)
            } else {
                ScrapeError::Network(e.to_string())
            }
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        max_retries: u32,
        timeout: Duration,
    ) -> ScrapeResult<String> {
        let mut attempt = 0;
        loop {
            match self.get_once(url, headers, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    debug!(url = %url, attempt, error = %e, "Request failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
