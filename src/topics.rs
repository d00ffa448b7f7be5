use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::models::FeedSource;

/// Upper bound on feeds queried for a single request.
pub const MAX_FEEDS_PER_REQUEST: usize = 20;

/// Immutable topic → feed lookup table built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TopicCatalog {
    topics: HashMap<String, Vec<FeedSource>>,
    general: Vec<FeedSource>,
}

impl TopicCatalog {
    pub fn new(topics: HashMap<String, Vec<FeedSource>>, general: Vec<FeedSource>) -> Self {
        let mut normalized: HashMap<String, Vec<FeedSource>> = HashMap::new();
        for (name, feeds) in topics {
            normalized
                .entry(normalize_topic(&name))
                .or_default()
                .extend(feeds);
        }

        Self {
            topics: normalized,
            general,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.topics.clone(), config.general.clone())
    }

    /// Feeds configured for one topic; empty for unknown topics.
    pub fn feeds_for(&self, topic: &str) -> &[FeedSource] {
        self.topics
            .get(&normalize_topic(topic))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn general(&self) -> &[FeedSource] {
        &self.general
    }

    /// Known topic names, sorted.
    pub fn topic_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.topics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Maps requested topics to the feeds to query.
    ///
    /// Feeds are deduplicated by URL in discovery order. When nothing
    /// matches, the general pool is used instead. The result never exceeds
    /// [`MAX_FEEDS_PER_REQUEST`] feeds.
    pub fn resolve<S: AsRef<str>>(&self, topics: &[S]) -> Vec<FeedSource> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for topic in topics {
            for feed in self.feeds_for(topic.as_ref()) {
                if seen.insert(feed.url.as_str()) {
                    selected.push(feed.clone());
                }
            }
        }

        if selected.is_empty() {
            for feed in &self.general {
                if seen.insert(feed.url.as_str()) {
                    selected.push(feed.clone());
                }
            }
        }

        selected.truncate(MAX_FEEDS_PER_REQUEST);
        selected
    }
}

pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}
