use std::sync::Arc;
use std::time::Duration;

use tech_pulse::cache::{self, MemoryCache};
use tech_pulse::config::Config;
use tech_pulse::routes::{self, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tech_pulse=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("FEEDS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        path = %config_path,
        topics = config.topics.len(),
        general = config.general.len(),
        "Loaded feed configuration"
    );

    let cache = Arc::new(MemoryCache::new());
    let state = Arc::new(AppState::from_config(&config, cache.clone())?);

    // Start background purge of expired cache entries
    let purge_interval = Duration::from_secs(config.cache_ttl_secs.max(60));
    tokio::spawn(async move {
        cache::start_background_purge(cache, purge_interval).await;
    });

    let app = routes::router(state);

    // Start server
    let listen = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| config.listen.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("Server starting on http://{}", listen);

    axum::serve(listener, app).await?;

    Ok(())
}
