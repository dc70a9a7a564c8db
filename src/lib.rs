//! Recipe-Ingest: resumable recipe acquisition from provider websites
//!
//! This crate drives a checkpointed saga per provider: URL discovery,
//! fingerprint-based duplicate detection, rate-limited processing and batch
//! persistence, tolerating partial failure and process restarts.

pub mod config;
pub mod discovery;
pub mod fingerprint;
pub mod ingredients;
pub mod providers;
pub mod rate_limit;
pub mod retry;
pub mod saga;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Recipe-Ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Rate limited by provider at {url}")]
    RateLimitedResponse { url: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Malformed content at {url}: {message}")]
    MalformedContent { url: String, message: String },

    #[error("Render error for {url}: {message}")]
    Render { url: String, message: String },

    #[error("Unsupported discovery strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("No renderer available for dynamic discovery of provider {0}")]
    RendererUnavailable(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("No enabled providers configured")]
    NoEnabledProviders,

    #[error("Saga not found: {0}")]
    SagaNotFound(String),

    #[error("Saga {correlation_id} is already {status}")]
    SagaTerminal {
        correlation_id: String,
        status: saga::SagaStatus,
    },

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidPhaseTransition {
        from: saga::SagaPhase,
        to: saga::SagaPhase,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown discovery strategy: {0}")]
    UnknownStrategy(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Recipe-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use discovery::{DiscoveredUrl, DiscoveryEngine};
pub use providers::{DiscoveryStrategyKind, ProviderConfigCache, ProviderConfiguration};
pub use rate_limit::RateLimiter;
pub use retry::{classify, ErrorClass};
pub use saga::{SagaOrchestrator, SagaPhase, SagaState, SagaStatus};
pub use crate::url::{normalize_url, LinkKind, UrlClassifier};
