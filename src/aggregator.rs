use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheError, EdgeCache};
use crate::fetcher::Fetcher;
use crate::models::Article;
use crate::topics::{normalize_topic, TopicCatalog};

/// Upper bound on unique articles kept per topic combination.
pub const MAX_CANONICAL_ARTICLES: usize = 200;

const CACHE_KEY_PREFIX: &str = "canonical:v1:";

#[derive(Serialize)]
struct CachedSetRef<'a> {
    articles: &'a [Article],
}

#[derive(Deserialize)]
struct CachedSet {
    articles: Vec<Article>,
}

/// Cache identity for a topic combination; independent of request order.
pub fn cache_key<S: AsRef<str>>(topics: &[S]) -> String {
    let mut normalized: Vec<String> = topics
        .iter()
        .map(|topic| normalize_topic(topic.as_ref()))
        .collect();
    normalized.sort();
    normalized.dedup();
    format!("{}{}", CACHE_KEY_PREFIX, normalized.join(","))
}

/// Flattens per-feed batches into the canonical ordering.
///
/// The first article seen for each title key wins, collection stops at
/// [`MAX_CANONICAL_ARTICLES`], and the survivors are ordered newest first
/// with undated articles last. Equal timestamps keep their flatten order.
pub fn merge(batches: Vec<Vec<Article>>) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for article in batches.into_iter().flatten() {
        if seen.insert(article.dedup_key()) {
            unique.push(article);
            if unique.len() >= MAX_CANONICAL_ARTICLES {
                break;
            }
        }
    }

    unique.sort_by_key(|article| (article.timestamp == 0, Reverse(article.timestamp)));
    unique
}

pub struct Aggregator {
    catalog: Arc<TopicCatalog>,
    fetcher: Fetcher,
    cache: Arc<dyn EdgeCache>,
    cache_ttl: Duration,
}

impl Aggregator {
    pub fn new(
        catalog: Arc<TopicCatalog>,
        fetcher: Fetcher,
        cache: Arc<dyn EdgeCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            cache,
            cache_ttl,
        }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Canonical result set for `topics`, served from cache unless `refresh`.
    ///
    /// Freshly computed non-empty sets replace the cached entry. An empty
    /// aggregation is returned as-is and never cached.
    pub async fn canonical<S: AsRef<str>>(
        &self,
        topics: &[S],
        refresh: bool,
    ) -> Result<Vec<Article>, CacheError> {
        let key = cache_key(topics);

        if !refresh {
            if let Some(articles) = self.cached(&key).await? {
                debug!(key = %key, count = articles.len(), "Canonical set cache hit");
                return Ok(articles);
            }
            debug!(key = %key, "Canonical set cache miss");
        }

        let articles = self.aggregate(topics, refresh).await;
        if articles.is_empty() {
            warn!(key = %key, "No articles from any feed; result not cached");
            return Ok(articles);
        }

        let payload = serde_json::to_vec(&CachedSetRef {
            articles: &articles,
        })?;
        self.cache.put(&key, payload, self.cache_ttl).await?;

        Ok(articles)
    }

    /// Fetches every resolved feed concurrently and merges the results.
    pub async fn aggregate<S: AsRef<str>>(&self, topics: &[S], bypass_body_cache: bool) -> Vec<Article> {
        let feeds = self.catalog.resolve(topics);
        let batches = join_all(
            feeds
                .iter()
                .map(|feed| self.fetcher.fetch(feed, bypass_body_cache)),
        )
        .await;

        let fetched: usize = batches.iter().map(Vec::len).sum();
        let articles = merge(batches);
        info!(
            feeds = feeds.len(),
            fetched,
            unique = articles.len(),
            "Aggregated feeds"
        );
        articles
    }

    async fn cached(&self, key: &str) -> Result<Option<Vec<Article>>, CacheError> {
        let Some(bytes) = self.cache.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<CachedSet>(&bytes) {
            Ok(set) => Ok(Some(set.articles)),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                Ok(None)
            }
        }
    }
}
