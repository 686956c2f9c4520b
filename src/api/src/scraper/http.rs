//! Plain HTTP page fetcher shared by the portal and authority adapters.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{PageCache, PageKind};
use crate::config::ScraperConfig;
use crate::retry::{retry, RetryConfig, Retryable};

/// Page fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Page not found: {0}")]
    NotFound(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::NotFound(_) => false,
        }
    }
}

/// HTTP fetcher with request spacing, retry and an optional page cache
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    delay: Duration,
    retry: RetryConfig,
    cache: Option<PageCache>,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        let cache = config
            .cache_enabled
            .then(|| PageCache::new(&config.cache_dir));

        Ok(Self {
            client,
            delay: Duration::from_millis(config.delay_ms),
            retry: RetryConfig::network(),
            cache,
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    /// Override the retry policy
    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Keep at least `delay` between consecutive requests
    async fn wait_for_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        self.wait_for_turn().await;

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// GET a page, going through the cache when a kind/key is given
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        cache_key: Option<(PageKind, &str)>,
    ) -> Result<String, FetchError> {
        self.get_checked(url, query, cache_key, |_| true).await
    }

    /// Like [`get`](Self::get), but a fetched body is only cached when
    /// `cacheable` accepts it
    pub async fn get_checked(
        &self,
        url: &str,
        query: &[(&str, String)],
        cache_key: Option<(PageKind, &str)>,
        cacheable: impl Fn(&str) -> bool,
    ) -> Result<String, FetchError> {
        if let (Some(cache), Some((kind, key))) = (&self.cache, cache_key) {
            if let Some(body) = cache.get(kind, key) {
                debug!("Cache hit: {} {}", kind.dir_name(), key);
                return Ok(body);
            }
        }

        info!("Fetching {}", url);
        let body = retry(&self.retry, url, || self.get_once(url, query)).await?;

        if let (Some(cache), Some((kind, key))) = (&self.cache, cache_key) {
            if !cacheable(&body) {
                debug!("Not caching {}: page not ready", url);
            } else if let Err(e) = cache.set(kind, key, url, &body) {
                warn!("Failed to cache {}: {}", url, e);
            }
        }

        Ok(body)
    }
}
