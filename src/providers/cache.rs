//! Provider configuration cache
//!
//! Configurations are read from a [`ProviderStore`] and kept in a concurrent
//! map with a per-entry time-to-live. Misses are cached too, so an unknown
//! provider id does not hit the store on every lookup. The compiled URL
//! patterns derived from a configuration are owned here as well and are
//! dropped together with the configuration they came from.

use crate::providers::ProviderConfiguration;
use crate::storage::{ProviderStore, StorageError};
use crate::url::UrlPatterns;
use crate::IngestError;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Default time-to-live for cached configurations
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

type CachedConfig = Option<Arc<ProviderConfiguration>>;

/// TTL cache over the provider configuration store
pub struct ProviderConfigCache {
    store: Arc<dyn ProviderStore>,
    ttl: Duration,
    entries: DashMap<String, CacheEntry<CachedConfig>>,
    enabled: RwLock<Option<CacheEntry<Vec<Arc<ProviderConfiguration>>>>>,
    patterns: DashMap<String, Arc<UrlPatterns>>,
}

impl ProviderConfigCache {
    /// Creates a cache with the default one-hour TTL
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn ProviderStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: DashMap::new(),
            enabled: RwLock::new(None),
            patterns: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Gets a provider configuration, refreshing expired entries lazily
    ///
    /// Returns `Ok(None)` for unknown providers; the miss is cached.
    pub fn get_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<Option<Arc<ProviderConfiguration>>, IngestError> {
        if let Some(entry) = self.entries.get(provider_id) {
            if entry.is_fresh() {
                return Ok(entry.value.clone());
            }
        }

        tracing::debug!(provider = provider_id, "Loading provider configuration");
        let loaded = self.store.get_provider(provider_id)?.map(Arc::new);

        // A refreshed configuration may carry different patterns
        self.patterns.remove(provider_id);
        self.entries.insert(
            provider_id.to_string(),
            CacheEntry::new(loaded.clone(), self.ttl),
        );

        Ok(loaded)
    }

    /// Gets a provider configuration or fails with `ProviderNotFound`
    pub fn require(&self, provider_id: &str) -> Result<Arc<ProviderConfiguration>, IngestError> {
        self.get_by_provider_id(provider_id)?
            .ok_or_else(|| IngestError::ProviderNotFound(provider_id.to_string()))
    }

    /// Gets all enabled provider configurations
    pub fn get_all_enabled(&self) -> Result<Vec<Arc<ProviderConfiguration>>, IngestError> {
        {
            let enabled = self.enabled.read().map_err(|_| StorageError::Poisoned)?;
            if let Some(entry) = enabled.as_ref().filter(|e| e.is_fresh()) {
                return Ok(entry.value.clone());
            }
        }

        let configs = self.refresh_enabled()?;
        Ok(configs)
    }

    /// Eagerly loads every enabled provider into the cache
    ///
    /// Fails with `NoEnabledProviders` when there is nothing to run.
    pub fn load_configurations(&self) -> Result<Vec<Arc<ProviderConfiguration>>, IngestError> {
        self.clear_cache()?;
        let configs = self.refresh_enabled()?;

        if configs.is_empty() {
            return Err(IngestError::NoEnabledProviders);
        }

        tracing::info!("Loaded {} enabled provider configurations", configs.len());
        Ok(configs)
    }

    fn refresh_enabled(&self) -> Result<Vec<Arc<ProviderConfiguration>>, IngestError> {
        let configs: Vec<Arc<ProviderConfiguration>> = self
            .store
            .list_enabled_providers()?
            .into_iter()
            .map(Arc::new)
            .collect();

        for config in &configs {
            self.patterns.remove(&config.provider_id);
            self.entries.insert(
                config.provider_id.clone(),
                CacheEntry::new(Some(config.clone()), self.ttl),
            );
        }

        let mut enabled = self.enabled.write().map_err(|_| StorageError::Poisoned)?;
        *enabled = Some(CacheEntry::new(configs.clone(), self.ttl));

        Ok(configs)
    }

    /// Compiled URL patterns for a provider
    ///
    /// Patterns are compiled on first use and kept until the provider's
    /// configuration is invalidated or refreshed.
    pub fn url_patterns(&self, config: &ProviderConfiguration) -> Arc<UrlPatterns> {
        self.patterns
            .entry(config.provider_id.clone())
            .or_insert_with(|| {
                Arc::new(UrlPatterns::compile(
                    config.recipe_url_pattern.as_deref(),
                    config.category_url_pattern.as_deref(),
                ))
            })
            .clone()
    }

    /// Drops one provider from the cache
    pub fn invalidate_cache(&self, provider_id: &str) -> Result<(), IngestError> {
        self.entries.remove(provider_id);
        self.patterns.remove(provider_id);
        let mut enabled = self.enabled.write().map_err(|_| StorageError::Poisoned)?;
        *enabled = None;
        tracing::debug!(provider = provider_id, "Invalidated provider configuration");
        Ok(())
    }

    /// Drops every cached entry
    pub fn clear_cache(&self) -> Result<(), IngestError> {
        self.entries.clear();
        self.patterns.clear();
        let mut enabled = self.enabled.write().map_err(|_| StorageError::Poisoned)?;
        *enabled = None;
        Ok(())
    }
}
