use crate::config::types::{Config, IngestConfig, ProviderEntry, UserAgentConfig};
use crate::providers::DiscoveryStrategyKind;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_ingest_config(&config.ingest)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_providers(&config.providers)?;
    Ok(())
}

/// Validates saga runtime configuration
fn validate_ingest_config(config: &IngestConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.cache_ttl_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "cache_ttl_seconds must be >= 1, got {}",
            config.cache_ttl_seconds
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates provider entries
///
/// Regex patterns are not compiled here: an invalid pattern
/// falls back to default classification at crawl time.
fn validate_providers(providers: &[ProviderEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in providers {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate provider id '{}'",
                entry.id
            )));
        }

        entry.discovery_strategy.parse::<DiscoveryStrategyKind>()?;

        let root = Url::parse(&entry.root_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid root_url '{}' for provider '{}': {}",
                entry.root_url, entry.id, e
            ))
        })?;

        if root.scheme() != "http" && root.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "root_url '{}' for provider '{}' must use HTTP or HTTPS",
                entry.root_url, entry.id
            )));
        }

        if entry.batch_size < 1 {
            return Err(ConfigError::Validation(format!(
                "batch_size for provider '{}' must be >= 1",
                entry.id
            )));
        }

        if entry.time_window_minutes < 1 {
            return Err(ConfigError::Validation(format!(
                "time_window_minutes for provider '{}' must be >= 1",
                entry.id
            )));
        }

        if entry.max_requests_per_minute < 1 {
            return Err(ConfigError::Validation(format!(
                "max_requests_per_minute for provider '{}' must be >= 1",
                entry.id
            )));
        }

        if entry.request_timeout_seconds < 1 {
            return Err(ConfigError::Validation(format!(
                "request_timeout_seconds for provider '{}' must be >= 1",
                entry.id
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
