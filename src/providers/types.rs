use crate::config::ProviderEntry;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a provider's recipe URLs are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStrategyKind {
    /// Plain HTML crawl
    Static,
    /// Crawl of the JavaScript-rendered DOM
    Dynamic,
    /// Single JSON endpoint
    Api,
}

impl DiscoveryStrategyKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Api => "api",
        }
    }
}

impl FromStr for DiscoveryStrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "dynamic" | "rendered" => Ok(Self::Dynamic),
            "api" => Ok(Self::Api),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for DiscoveryStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Per-provider parameters for discovery, rate limiting and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    pub provider_id: String,
    pub enabled: bool,
    pub discovery_strategy: DiscoveryStrategyKind,
    pub root_url: String,
    pub batch_size: u32,
    pub time_window_minutes: u32,
    pub min_delay_seconds: u32,
    pub max_requests_per_minute: u32,
    pub retry_count: u32,
    pub request_timeout_seconds: u32,
    pub recipe_url_pattern: Option<String>,
    pub category_url_pattern: Option<String>,
    pub max_depth: u32,
    pub max_urls: u32,
}

impl ProviderConfiguration {
    pub fn time_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_window_minutes) * 60)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_delay_seconds))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_seconds))
    }
}

impl TryFrom<&ProviderEntry> for ProviderConfiguration {
    type Error = ConfigError;

    fn try_from(entry: &ProviderEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            provider_id: entry.id.clone(),
            enabled: entry.enabled,
            discovery_strategy: entry.discovery_strategy.parse()?,
            root_url: entry.root_url.clone(),
            batch_size: entry.batch_size,
            time_window_minutes: entry.time_window_minutes,
            min_delay_seconds: entry.min_delay_seconds,
            max_requests_per_minute: entry.max_requests_per_minute,
            retry_count: entry.retry_count,
            request_timeout_seconds: entry.request_timeout_seconds,
            recipe_url_pattern: entry.recipe_url_pattern.clone(),
            category_url_pattern: entry.category_url_pattern.clone(),
            max_depth: entry.max_depth,
            max_urls: entry.max_urls,
        })
    }
}
