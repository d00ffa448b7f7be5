use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::EdgeCache;
use crate::config::Config;
use crate::models::{Article, FeedSource};
use crate::parser::parse_feed;

/// Feed bodies larger than this are rejected.
pub const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Response too large")]
    ResponseTooLarge,
}

#[derive(Clone)]
struct BodyCache {
    store: Arc<dyn EdgeCache>,
    ttl: Duration,
}

/// Retrieves and parses single feeds. Failures never escape [`Fetcher::fetch`];
/// a feed that cannot be fetched or parsed contributes no articles.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    body_cache: Option<BodyCache>,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            timeout,
            body_cache: None,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(&config.user_agent, config.fetch_timeout())
    }

    /// Keeps successful raw bodies in `store` for `ttl`, keyed by feed URL.
    pub fn with_body_cache(mut self, store: Arc<dyn EdgeCache>, ttl: Duration) -> Self {
        self.body_cache = Some(BodyCache { store, ttl });
        self
    }

    /// Fetches and parses one feed, returning no articles on any failure.
    ///
    /// `bypass_cache` skips the body cache read; a fresh body is still written.
    pub async fn fetch(&self, feed: &FeedSource, bypass_cache: bool) -> Vec<Article> {
        match self.fetch_body(feed, bypass_cache).await {
            Ok(body) => {
                let articles = parse_feed(&body, &feed.source, &feed.tag);
                debug!(url = %feed.url, count = articles.len(), "Parsed feed");
                articles
            }
            Err(e) => {
                warn!(url = %feed.url, source = %feed.source, error = %e, "Skipping feed");
                Vec::new()
            }
        }
    }

    /// Raw body of one feed, bounded by the fetch timeout.
    pub async fn fetch_body(&self, feed: &FeedSource, bypass_cache: bool) -> Result<String, FetchError> {
        if !bypass_cache {
            if let Some(body) = self.cached_body(&feed.url).await {
                debug!(url = %feed.url, "Feed body served from cache");
                return Ok(body);
            }
        }

        let body = tokio::time::timeout(self.timeout, self.download(&feed.url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        self.store_body(&feed.url, &body).await;
        Ok(body)
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_FEED_BYTES as u64)
        {
            return Err(FetchError::ResponseTooLarge);
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_FEED_BYTES {
            return Err(FetchError::ResponseTooLarge);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn cached_body(&self, url: &str) -> Option<String> {
        let cache = self.body_cache.as_ref()?;
        match cache.store.get(&body_cache_key(url)).await {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(url, error = %e, "Feed body cache read failed");
                None
            }
        }
    }

    async fn store_body(&self, url: &str, body: &str) {
        let Some(cache) = &self.body_cache else {
            return;
        };
        if let Err(e) = cache
            .store
            .put(&body_cache_key(url), body.as_bytes().to_vec(), cache.ttl)
            .await
        {
            warn!(url, error = %e, "Feed body cache write failed");
        }
    }
}

fn body_cache_key(url: &str) -> String {
    format!("feed-body:{}", url)
}
