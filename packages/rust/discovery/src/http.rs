//! HTTP fetching with linear-backoff retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use docscrawl_shared::{CrawlerConfig, DocsCrawlError, Result};

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Shared HTTP client plus the retry and politeness policy from [`CrawlerConfig`].
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
    rate_limit: Duration,
}

impl Fetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout())
            .build()
            .map_err(|e| DocsCrawlError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay()?,
            rate_limit: config.rate_limit(),
        })
    }

    /// GET `url` and return the body, retrying failures.
    ///
    /// Makes `max(max_retries, 1)` attempts. After failed attempt `n` (0-based)
    /// it sleeps `retry_delay * (n + 1)` before trying again. Non-2xx
    /// responses count as failures. The last error is returned.
    ///
    /// A configured rate limit is slept once before the first attempt.
    pub async fn get(&self, url: &str) -> Result<String> {
        let attempts = self.max_retries.max(1);
        let mut last_error = None;

        if !self.rate_limit.is_zero() {
            tokio::time::sleep(self.rate_limit).await;
        }

        for attempt in 0..attempts {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(%url, attempt = attempt + 1, attempts, error = %e, "request failed");
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry_delay.saturating_mul(attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DocsCrawlError::Network(format!("{url}: no request attempted"))))
    }

    /// Single GET that yields the body only for `200 OK`.
    ///
    /// Used for robots.txt and sitemap lookups, where a miss is expected.
    pub async fn try_get(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%url, error = %e, "lookup failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "lookup miss");
            return None;
        }

        response.text().await.ok()
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DocsCrawlError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocsCrawlError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| DocsCrawlError::Network(format!("{url}: failed to read body: {e}")))
    }
}
