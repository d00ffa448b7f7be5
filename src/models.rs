use serde::{Deserialize, Serialize};

/// Number of lowercased title characters that identify an article.
pub const DEDUP_KEY_CHARS: usize = 60;

/// A configured RSS/Atom endpoint with its display name and topic tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedSource {
    pub url: String,
    pub source: String,
    pub tag: String,
}

impl FeedSource {
    pub fn new(url: &str, source: &str, tag: &str) -> Self {
        Self {
            url: url.to_string(),
            source: source.to_string(),
            tag: tag.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub summary: String,
    /// Date string exactly as the feed published it.
    pub date: String,
    /// Epoch milliseconds parsed from `date`, 0 when unparsable. Never serialized.
    #[serde(skip)]
    pub timestamp: i64,
    pub source: String,
    pub tag: String,
}

impl Article {
    /// Identity used for deduplication across feeds.
    pub fn dedup_key(&self) -> String {
        self.title
            .to_lowercase()
            .chars()
            .take(DEDUP_KEY_CHARS)
            .collect()
    }
}
