//! Recipe URL discovery
//!
//! Three interchangeable strategies share one contract: given a root URL,
//! produce the recipe URLs reachable from it.
//!
//! - `StaticDiscovery`: crawls raw HTML
//! - `RenderedDiscovery`: crawls the JavaScript-rendered DOM
//! - `ApiDiscovery`: reads a single JSON endpoint
//!
//! `DiscoveryEngine` picks one by the provider's configured strategy.

mod api;
mod crawl;
mod fetcher;
mod parser;
mod rendered;
mod static_crawl;

pub use api::ApiDiscovery;
pub use crawl::{CrawlLimits, PageSource};
pub use fetcher::{build_http_client, fetch_json, fetch_page, FetchedPage};
pub use parser::{extract_recipe_ingredients, parse_html, ParsedPage};
#[cfg(feature = "headless")]
pub use rendered::ChromeRenderer;
pub use rendered::{PageRenderer, RenderedDiscovery};
pub use static_crawl::StaticDiscovery;

use crate::providers::{DiscoveryStrategyKind, ProviderConfiguration};
use crate::url::{LinkKind, UrlClassifier};
use crate::{IngestError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A candidate recipe URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    /// Absolute URL
    pub url: String,
    pub provider_id: String,
    /// Page or endpoint the URL was found on
    pub discovered_from: String,
    pub depth: u32,
    /// In [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Recipe/category classification shared by every strategy
pub trait LinkClassification {
    fn classifier(&self) -> &UrlClassifier;

    fn classify_link(&self, url: &Url) -> LinkKind {
        self.classifier().classify(url)
    }

    fn link_confidence(&self, url: &Url) -> f64 {
        UrlClassifier::confidence(url)
    }
}

/// Discovery strategy selected from a provider configuration
pub enum DiscoveryEngine {
    Static(StaticDiscovery),
    Rendered(RenderedDiscovery),
    Api(ApiDiscovery),
}

impl DiscoveryEngine {
    /// Builds the engine for a provider
    ///
    /// # Arguments
    ///
    /// * `config` - The provider configuration
    /// * `classifier` - Classifier built from the provider's cached patterns
    /// * `client` - HTTP client for static and API discovery
    /// * `renderer` - Renderer for dynamic discovery, if one is available
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryEngine)` - The strategy to use
    /// * `Err(IngestError::RendererUnavailable)` - Dynamic discovery without a renderer
    pub fn for_provider(
        config: &ProviderConfiguration,
        classifier: UrlClassifier,
        client: Client,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Result<Self> {
        match config.discovery_strategy {
            DiscoveryStrategyKind::Static => {
                Ok(Self::Static(StaticDiscovery::new(client, classifier)))
            }
            DiscoveryStrategyKind::Dynamic => {
                let renderer = renderer
                    .ok_or_else(|| IngestError::RendererUnavailable(config.provider_id.clone()))?;
                Ok(Self::Rendered(RenderedDiscovery::new(renderer, classifier)))
            }
            DiscoveryStrategyKind::Api => Ok(Self::Api(ApiDiscovery::new(client, classifier))),
        }
    }

    pub fn kind(&self) -> DiscoveryStrategyKind {
        match self {
            Self::Static(_) => DiscoveryStrategyKind::Static,
            Self::Rendered(_) => DiscoveryStrategyKind::Dynamic,
            Self::Api(_) => DiscoveryStrategyKind::Api,
        }
    }

    /// Discovers recipe URLs starting at `root_url`
    ///
    /// Every call starts a fresh crawl. `max_depth` is ignored by API
    /// discovery, which never recurses.
    pub async fn discover_recipe_urls(
        &self,
        root_url: &str,
        provider_id: &str,
        max_depth: u32,
        max_urls: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredUrl>> {
        let root = Url::parse(root_url)?;
        let limits = CrawlLimits {
            max_depth,
            max_urls,
        };

        tracing::info!(
            provider = provider_id,
            strategy = %self.kind(),
            root = %root,
            max_depth,
            max_urls,
            "Starting discovery"
        );

        match self {
            Self::Static(s) => s.discover_recipe_urls(&root, provider_id, limits, cancel).await,
            Self::Rendered(r) => r.discover_recipe_urls(&root, provider_id, limits, cancel).await,
            Self::Api(a) => a.discover_recipe_urls(&root, provider_id, max_urls, cancel).await,
        }
    }
}
