//! HTTP fetcher
//!
//! This module handles all HTTP requests for discovery and processing:
//! - Building HTTP clients with the configured user agent and timeout
//! - GET requests for HTML pages and JSON endpoints
//! - Mapping failures to typed errors the retry classifier understands

use crate::config::UserAgentConfig;
use crate::{IngestError, Result};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout, normally the provider's request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use recipe_ingest::config::UserAgentConfig;
/// use recipe_ingest::discovery::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "RecipeIngest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches an HTML page
///
/// # Error Mapping
///
/// | Condition | Error |
/// |-----------|-------|
/// | HTTP 404 / 410 | `NotFound` |
/// | HTTP 429 | `RateLimitedResponse` |
/// | Other non-2xx | `HttpStatus` |
/// | Request timeout | `Timeout` |
/// | Connection and other transport failures | `Http` |
/// | Content-Type is not HTML | `MalformedContent` |
pub async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedPage> {
    let response = send(client, url).await?;
    let status_code = response.status().as_u16();
    let final_url = response.url().clone();

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html(&content_type) {
        return Err(IngestError::MalformedContent {
            url: url.to_string(),
            message: format!("expected HTML, got '{}'", content_type),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(url, e))?;

    Ok(FetchedPage {
        final_url,
        status_code,
        content_type,
        body,
    })
}

/// Fetches and parses a JSON document
pub async fn fetch_json(client: &Client, url: &Url) -> Result<serde_json::Value> {
    let response = send(client, url).await?;
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(url, e))?;

    serde_json::from_str(&body).map_err(|e| IngestError::MalformedContent {
        url: url.to_string(),
        message: format!("invalid JSON: {}", e),
    })
}

async fn send(client: &Client, url: &Url) -> Result<Response> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = url.to_string();
    Err(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => IngestError::NotFound { url },
        StatusCode::TOO_MANY_REQUESTS => IngestError::RateLimitedResponse { url },
        other => IngestError::HttpStatus {
            url,
            status: other.as_u16(),
        },
    })
}

fn transport_error(url: &Url, error: reqwest::Error) -> IngestError {
    if error.is_timeout() {
        IngestError::Timeout {
            url: url.to_string(),
        }
    } else {
        IngestError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}
