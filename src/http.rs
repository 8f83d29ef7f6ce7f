//! HTTP fetching with retry and cancellation.
//!
//! The pipeline never talks to `reqwest` directly. It goes through the
//! [`Fetcher`] trait so tests can swap the network for fixtures:
//!
//! - [`HttpFetcher`]: real network access via a shared `reqwest::Client`
//! - [`RetryFetch`]: decorator adding exponential backoff to any fetcher
//!
//! Every fetch made by a pipeline stage goes through [`fetch_text`], which
//! treats an empty URL as a no-op and races the request against the run's
//! cancellation token.
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, 429, 5xx)
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::error::{ArchiveError, Result};
use async_trait::async_trait;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Source of page bodies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` and return its body as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetch `url` unless it is empty or the run is cancelled first.
///
/// An empty URL returns an empty body without touching the fetcher, so topic
/// rows whose content link could not be resolved flow through storage
/// harmlessly.
pub async fn fetch_text(
    fetcher: &dyn Fetcher,
    url: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    if url.is_empty() {
        return Ok(String::new());
    }
    if cancel.is_cancelled() {
        return Err(ArchiveError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
        body = fetcher.fetch_text(url) => body,
    }
}

/// Network-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: StdDuration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ArchiveError::fetch("<client>", e))?;
        Ok(Self { client })
    }

    /// Issue a GET and fail on non-success statuses.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let t0 = Instant::now();
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetcher`].
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: Fetcher,
{
    /// Wrap `inner` so transient failures are retried with jittered
    /// exponential backoff.
    ///
    /// # Arguments
    ///
    /// * `inner` - Fetcher every attempt is delegated to
    /// * `max_retries` - Attempts after the first; zero disables retrying
    /// * `base_delay` - Wait before the first retry, doubled per attempt and capped at 30 seconds
    ///
    /// # Returns
    ///
    /// A [`Fetcher`] that only retries errors for which
    /// [`ArchiveError::is_transient`] holds.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(Duration::from_secs(60))?;
    /// let fetcher: Arc<dyn Fetcher> = Arc::new(RetryFetch::new(http, 3, Duration::from_secs(1)));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> Fetcher for RetryFetch<T>
where
    T: Fetcher,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_text(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
