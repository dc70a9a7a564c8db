//! Integration tests for URL discovery
//!
//! These tests use wiremock to serve provider sites and API endpoints and
//! drive the discovery engine the way a saga does.

use recipe_ingest::config::UserAgentConfig;
use recipe_ingest::discovery::{build_http_client, DiscoveryEngine};
use recipe_ingest::providers::{DiscoveryStrategyKind, ProviderConfiguration};
use recipe_ingest::url::{UrlClassifier, UrlPatterns};
use recipe_ingest::IngestError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestIngest".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn provider(strategy: DiscoveryStrategyKind, root_url: &str) -> ProviderConfiguration {
    ProviderConfiguration {
        provider_id: "test".to_string(),
        enabled: true,
        discovery_strategy: strategy,
        root_url: root_url.to_string(),
        batch_size: 10,
        time_window_minutes: 5,
        min_delay_seconds: 0,
        max_requests_per_minute: 600,
        retry_count: 0,
        request_timeout_seconds: 5,
        recipe_url_pattern: None,
        category_url_pattern: None,
        max_depth: 1,
        max_urls: 100,
    }
}

fn engine(config: &ProviderConfiguration, classifier: UrlClassifier) -> DiscoveryEngine {
    let client = build_http_client(&user_agent(), config.request_timeout()).unwrap();
    DiscoveryEngine::for_provider(config, classifier, client, None).unwrap()
}

async fn mount_html(server: &MockServer, page: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_static_discovery_follows_categories_to_max_depth() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<html><body>
            <a href="/recipe/chicken-pasta">Chicken pasta</a>
            <a href="/category/dinner">Dinner</a>
            <a href="/login">Log in</a>
        </body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/category/dinner",
        r#"<html><body>
            <a href="/recipe/beef-stew">Beef stew</a>
            <a href="/recipe/chicken-pasta">Chicken pasta again</a>
            <a href="/category/dinner/weeknight">Weeknight</a>
        </body></html>"#,
    )
    .await;

    // Depth 2 is past max_depth and must never be fetched
    Mock::given(method("GET"))
        .and(path("/category/dinner/weeknight"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = provider(DiscoveryStrategyKind::Static, &format!("{}/", base));
    let engine = engine(&config, UrlClassifier::with_defaults());

    let found = engine
        .discover_recipe_urls(&config.root_url, "test", 1, 100, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].url, format!("{}/recipe/chicken-pasta", base));
    assert_eq!(found[0].depth, 1);
    assert_eq!(found[0].confidence, 0.9);
    assert_eq!(found[1].url, format!("{}/recipe/beef-stew", base));
    assert_eq!(found[1].depth, 2);
    assert_eq!(found[1].discovered_from, format!("{}/category/dinner", base));
}

#[tokio::test]
async fn test_static_discovery_respects_max_urls() {
    let server = MockServer::start().await;
    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/recipe/dish-{}">r</a>"#, i))
        .collect();
    mount_html(&server, "/", &links).await;

    let config = provider(DiscoveryStrategyKind::Static, &format!("{}/", server.uri()));
    let engine = engine(&config, UrlClassifier::with_defaults());

    let found = engine
        .discover_recipe_urls(&config.root_url, "test", 1, 3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn test_provider_pattern_and_invalid_pattern_fallback() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<a href="/dishes/42">Custom</a><a href="/recipe/classic">Classic</a>"#,
    )
    .await;

    let config = provider(DiscoveryStrategyKind::Static, &format!("{}/", server.uri()));

    let custom = UrlClassifier::new(Arc::new(UrlPatterns::compile(Some(r"/dishes/\d+$"), None)));
    let found = engine(&config, custom)
        .discover_recipe_urls(&config.root_url, "test", 1, 100, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].url.ends_with("/dishes/42"));

    // An uncompilable pattern falls back to the default substrings
    let broken = UrlClassifier::new(Arc::new(UrlPatterns::compile(Some("(unclosed"), None)));
    let found = engine(&config, broken)
        .discover_recipe_urls(&config.root_url, "test", 1, 100, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].url.ends_with("/recipe/classic"));
}

#[tokio::test]
async fn test_static_root_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = provider(DiscoveryStrategyKind::Static, &format!("{}/", server.uri()));
    let result = engine(&config, UrlClassifier::with_defaults())
        .discover_recipe_urls(&config.root_url, "test", 1, 100, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(IngestError::HttpStatus { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_api_discovery_reads_items() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/recipes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "recipes": [
                    { "id": 1, "title": "Tomato soup", "url": format!("{}/recipe/tomato-soup", base) },
                    { "id": 2, "name": "Stew", "slug": "beef-stew" },
                    { "id": 3, "title": "No link" },
                    { "id": 4, "link": "/recipe/tomato-soup" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let config = provider(DiscoveryStrategyKind::Api, &format!("{}/api/recipes", base));
    let found = engine(&config, UrlClassifier::with_defaults())
        .discover_recipe_urls(&config.root_url, "test", 5, 100, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].url, format!("{}/recipe/tomato-soup", base));
    assert_eq!(found[0].depth, 0);
    assert_eq!(found[0].confidence, 0.95);
    assert_eq!(found[0].metadata.get("title").map(String::as_str), Some("Tomato soup"));
    assert_eq!(found[1].url, format!("{}/recipe/beef-stew", base));
    assert_eq!(found[1].metadata.get("id").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn test_api_discovery_rejects_unexpected_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/recipes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "count": 0 })))
        .mount(&server)
        .await;

    let config = provider(
        DiscoveryStrategyKind::Api,
        &format!("{}/api/recipes", server.uri()),
    );
    let result = engine(&config, UrlClassifier::with_defaults())
        .discover_recipe_urls(&config.root_url, "test", 1, 100, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(IngestError::MalformedContent { .. })));
}

#[test]
fn test_dynamic_strategy_requires_renderer() {
    let config = provider(DiscoveryStrategyKind::Dynamic, "https://example.com/");
    let client = build_http_client(&user_agent(), Duration::from_secs(5)).unwrap();

    let result = DiscoveryEngine::for_provider(&config, UrlClassifier::with_defaults(), client, None);
    assert!(matches!(result, Err(IngestError::RendererUnavailable(_))));
}
