use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::models::FeedSource;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Freshness window for cached result sets and feed bodies, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Ceiling for a single feed fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Keep raw feed bodies in the edge cache between requests
    #[serde(default = "default_cache_feed_bodies")]
    pub cache_feed_bodies: bool,
    /// Fallback pool used when no requested topic matches
    #[serde(default)]
    pub general: Vec<FeedSource>,
    #[serde(default)]
    pub topics: HashMap<String, Vec<FeedSource>>,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; TechPulseBot/1.0)".to_string()
}

fn default_cache_feed_bodies() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.general.is_empty() {
            anyhow::bail!("at least one [[general]] feed is required");
        }
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
