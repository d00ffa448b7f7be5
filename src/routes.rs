use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::aggregator::Aggregator;
use crate::cache::EdgeCache;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::pagination::{paginate, PageRequest, PageResponse};
use crate::topics::TopicCatalog;

const TOPICS_REQUIRED: &str = "Invalid request: 'topics' array required.";

pub struct AppState {
    pub aggregator: Aggregator,
}

impl AppState {
    /// Wires catalog and fetcher from config around a shared edge cache.
    pub fn from_config(config: &Config, cache: Arc<dyn EdgeCache>) -> anyhow::Result<Self> {
        let mut fetcher = Fetcher::from_config(config)?;
        if config.cache_feed_bodies {
            fetcher = fetcher.with_body_cache(cache.clone(), config.cache_ttl());
        }

        let catalog = Arc::new(TopicCatalog::from_config(config));
        Ok(Self {
            aggregator: Aggregator::new(catalog, fetcher, cache, config.cache_ttl()),
        })
    }
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            AppError::Internal(err) => {
                error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Aggregation error: {}", err),
                )
                    .into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError::Internal(err.into())
    }
}

/// Decoded body of an aggregation request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    pub topics: Vec<String>,
    pub page: PageRequest,
    pub refresh: bool,
}

impl FeedRequest {
    /// Decodes a JSON body. `topics` must be a non-empty array of strings;
    /// `page` and `limit` accept numbers or numeric strings and fall back to
    /// defaults otherwise.
    pub fn from_json(body: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request: {}", e)))?;
        let Value::Object(fields) = value else {
            return Err(AppError::BadRequest(TOPICS_REQUIRED.to_string()));
        };

        let topics = match fields.get("topics") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        }
        .ok_or_else(|| AppError::BadRequest(TOPICS_REQUIRED.to_string()))?;

        let page = PageRequest::new(
            fields.get("page").and_then(coerce_int),
            fields.get("limit").and_then(coerce_int),
        );
        let refresh = fields
            .get("refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            topics,
            page,
            refresh,
        })
    }
}

/// Integer from a JSON number (truncated) or a string with a leading integer.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let digits_end = s
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
                .map_or(s.len(), |(i, _)| i);
            s[..digits_end].parse().ok()
        }
        _ => None,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/",
            post(feed_updates)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Route handlers
pub async fn feed_updates(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PageResponse>, AppError> {
    let request = FeedRequest::from_json(&body)?;

    let articles = state
        .aggregator
        .canonical(&request.topics, request.refresh)
        .await?;

    Ok(Json(paginate(&articles, request.page)))
}

pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            ),
        ],
    )
}

pub async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::cache_key;
    use crate::cache::{CacheError, MemoryCache};
    use crate::models::{Article, FeedSource};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    const TTL: Duration = Duration::from_secs(600);

    struct FailingCache;

    #[async_trait]
    impl EdgeCache for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("store offline".to_string()))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("store offline".to_string()))
        }
    }

    fn create_test_app(cache: Arc<dyn EdgeCache>) -> Router {
        let mut topics = HashMap::new();
        topics.insert(
            "gaming".to_string(),
            vec![FeedSource::new("http://127.0.0.1:1/gaming", "Down", "Gaming")],
        );
        let catalog = Arc::new(TopicCatalog::new(
            topics,
            vec![FeedSource::new("http://127.0.0.1:1/general", "Down", "Tech")],
        ));
        let fetcher = Fetcher::new("TestBot/1.0", Duration::from_secs(1)).unwrap();

        router(Arc::new(AppState {
            aggregator: Aggregator::new(catalog, fetcher, cache, TTL),
        }))
    }

    fn sample_articles(n: usize) -> Vec<Article> {
        (0..n)
            .map(|i| Article {
                title: format!("Article {}", i),
                url: format!("https://example.com/{}", i),
                summary: "Summary".to_string(),
                date: "Mon, 09 Dec 2024 12:00:00 GMT".to_string(),
                timestamp: 0,
                source: "Example".to_string(),
                tag: "Gaming".to_string(),
            })
            .collect()
    }

    async fn seeded_cache(topics: &[&str], articles: &[Article]) -> Arc<MemoryCache> {
        let cache = Arc::new(MemoryCache::new());
        let payload = serde_json::to_vec(&serde_json::json!({ "articles": articles })).unwrap();
        cache.put(&cache_key(topics), payload, TTL).await.unwrap();
        cache
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let app = create_test_app(Arc::new(MemoryCache::new()));

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "OK");
        }
    }

    mod method_tests {
        use super::*;

        #[tokio::test]
        async fn test_options_preflight() {
            let app = create_test_app(Arc::new(MemoryCache::new()));

            let response = app
                .oneshot(
                    Request::builder()
                        .method("OPTIONS")
                        .uri("/")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let headers = response.headers();
            assert_eq!(headers["access-control-allow-origin"], "*");
            assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
            assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        }

        #[tokio::test]
        async fn test_browser_preflight() {
            let app = create_test_app(Arc::new(MemoryCache::new()));

            let response = app
                .oneshot(
                    Request::builder()
                        .method("OPTIONS")
                        .uri("/")
                        .header("origin", "chrome-extension://abc")
                        .header("access-control-request-method", "POST")
                        .header("access-control-request-headers", "content-type")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["access-control-allow-origin"], "*");
        }

        #[tokio::test]
        async fn test_get_is_rejected() {
            let app = create_test_app(Arc::new(MemoryCache::new()));

            let response = app
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers()["access-control-allow-origin"], "*");
            assert_eq!(body_string(response).await, "Method Not Allowed");
        }
    }

    mod validation_tests {
        use super::*;

        async fn status_for(body: &str) -> StatusCode {
            let app = create_test_app(Arc::new(MemoryCache::new()));
            app.oneshot(post_json(body)).await.unwrap().status()
        }

        #[tokio::test]
        async fn test_invalid_json() {
            assert_eq!(status_for("{not json").await, StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_missing_topics() {
            let app = create_test_app(Arc::new(MemoryCache::new()));
            let response = app.oneshot(post_json(r#"{"page": 1}"#)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(response.headers()["access-control-allow-origin"], "*");
            assert_eq!(body_string(response).await, TOPICS_REQUIRED);
        }

        #[tokio::test]
        async fn test_empty_topics() {
            assert_eq!(status_for(r#"{"topics": []}"#).await, StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_topics_wrong_type() {
            assert_eq!(status_for(r#"{"topics": "gaming"}"#).await, StatusCode::BAD_REQUEST);
            assert_eq!(status_for(r#"{"topics": [1, 2]}"#).await, StatusCode::BAD_REQUEST);
            assert_eq!(status_for(r#"["gaming"]"#).await, StatusCode::BAD_REQUEST);
        }
    }

    mod feed_updates_tests {
        use super::*;

        #[tokio::test]
        async fn test_serves_cached_set() {
            let cache = seeded_cache(&["gaming"], &sample_articles(20)).await;
            let app = create_test_app(cache);

            let response = app.oneshot(post_json(r#"{"topics": ["Gaming"]}"#)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["access-control-allow-origin"], "*");

            let json = body_json(response).await;
            assert_eq!(json["page"], 1);
            assert_eq!(json["limit"], 15);
            assert_eq!(json["total"], 20);
            assert_eq!(json["hasMore"], true);
            assert_eq!(json["updates"].as_array().unwrap().len(), 15);

            let first = &json["updates"][0];
            assert_eq!(first["title"], "Article 0");
            assert_eq!(first["url"], "https://example.com/0");
            assert_eq!(first["summary"], "Summary");
            assert_eq!(first["date"], "Mon, 09 Dec 2024 12:00:00 GMT");
            assert_eq!(first["source"], "Example");
            assert_eq!(first["tag"], "Gaming");
            assert!(first.get("timestamp").is_none());
        }

        #[tokio::test]
        async fn test_second_page() {
            let cache = seeded_cache(&["gaming"], &sample_articles(20)).await;
            let app = create_test_app(cache);

            let response = app
                .oneshot(post_json(r#"{"topics": ["gaming"], "page": 2}"#))
                .await
                .unwrap();
            let json = body_json(response).await;

            assert_eq!(json["page"], 2);
            assert_eq!(json["updates"].as_array().unwrap().len(), 5);
            assert_eq!(json["updates"][0]["title"], "Article 15");
            assert_eq!(json["hasMore"], false);
        }

        #[tokio::test]
        async fn test_limit_clamped() {
            let cache = seeded_cache(&["gaming"], &sample_articles(80)).await;
            let app = create_test_app(cache);

            let response = app
                .oneshot(post_json(r#"{"topics": ["gaming"], "limit": 999}"#))
                .await
                .unwrap();
            let json = body_json(response).await;

            assert_eq!(json["limit"], 50);
            assert_eq!(json["updates"].as_array().unwrap().len(), 50);
            assert_eq!(json["hasMore"], true);
        }

        #[tokio::test]
        async fn test_all_feeds_down_is_empty_success() {
            let app = create_test_app(Arc::new(MemoryCache::new()));

            let response = app
                .oneshot(post_json(r#"{"topics": ["gaming"], "page": 3, "limit": 5}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let json = body_json(response).await;
            assert_eq!(
                json,
                serde_json::json!({"updates": [], "page": 3, "limit": 5, "total": 0, "hasMore": false})
            );
        }

        #[tokio::test]
        async fn test_cache_failure_is_server_error() {
            let app = create_test_app(Arc::new(FailingCache));

            let response = app.oneshot(post_json(r#"{"topics": ["gaming"]}"#)).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                body_string(response).await,
                "Aggregation error: cache store unavailable: store offline"
            );
        }
    }

    mod feed_request_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let request = FeedRequest::from_json(br#"{"topics": ["AI"]}"#).unwrap();
            assert_eq!(request.topics, vec!["AI"]);
            assert_eq!(request.page, PageRequest::default());
            assert!(!request.refresh);
        }

        #[test]
        fn test_lenient_numbers() {
            let request =
                FeedRequest::from_json(br#"{"topics": ["AI"], "page": "3", "limit": 7.9, "refresh": true}"#)
                    .unwrap();
            assert_eq!(request.page, PageRequest::new(Some(3), Some(7)));
            assert!(request.refresh);
        }

        #[test]
        fn test_unusable_numbers_fall_back() {
            let request =
                FeedRequest::from_json(br#"{"topics": ["AI"], "page": "abc", "limit": null, "refresh": "yes"}"#)
                    .unwrap();
            assert_eq!(request.page, PageRequest::default());
            assert!(!request.refresh);
        }

        #[test]
        fn test_coerce_int() {
            assert_eq!(coerce_int(&serde_json::json!(12)), Some(12));
            assert_eq!(coerce_int(&serde_json::json!(-2.5)), Some(-2));
            assert_eq!(coerce_int(&serde_json::json!(" 42px")), Some(42));
            assert_eq!(coerce_int(&serde_json::json!("-4")), Some(-4));
            assert_eq!(coerce_int(&serde_json::json!("")), None);
            assert_eq!(coerce_int(&serde_json::json!(true)), None);
        }
    }
}
