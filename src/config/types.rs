use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Recipe-Ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ingest: IngestConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default, rename = "provider")]
    pub providers: Vec<ProviderEntry>,
    #[serde(default, rename = "ingredient-mappings")]
    pub ingredient_mappings: HashMap<String, String>,
}

/// Saga runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Provider configuration cache time-to-live (seconds)
    #[serde(rename = "cache-ttl-seconds", default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Number of processed items between named checkpoints
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Fixed delay before the single rate-limit token retry (milliseconds)
    #[serde(rename = "rate-limit-backoff-ms", default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_ms: u64,

    /// Base delay for discovery retries (milliseconds)
    #[serde(
        rename = "discovery-retry-base-delay-ms",
        default = "default_discovery_retry_base_delay"
    )]
    pub discovery_retry_base_delay_ms: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// A provider definition as written in the configuration file
///
/// These entries seed the configuration store at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(rename = "discovery-strategy")]
    pub discovery_strategy: String,

    #[serde(rename = "root-url")]
    pub root_url: String,

    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    #[serde(rename = "time-window-minutes")]
    pub time_window_minutes: u32,

    #[serde(rename = "min-delay-seconds", default)]
    pub min_delay_seconds: u32,

    #[serde(rename = "max-requests-per-minute")]
    pub max_requests_per_minute: u32,

    #[serde(rename = "retry-count", default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(rename = "request-timeout-seconds", default = "default_request_timeout")]
    pub request_timeout_seconds: u32,

    #[serde(rename = "recipe-url-pattern")]
    pub recipe_url_pattern: Option<String>,

    #[serde(rename = "category-url-pattern")]
    pub category_url_pattern: Option<String>,

    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(rename = "max-urls", default = "default_max_urls")]
    pub max_urls: u32,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_rate_limit_backoff() -> u64 {
    500
}

fn default_discovery_retry_base_delay() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

fn default_retry_count() -> u32 {
    3
}

fn default_request_timeout() -> u32 {
    30
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_urls() -> u32 {
    500
}
