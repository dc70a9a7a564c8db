//! Discovery against the JavaScript-rendered DOM
//!
//! The crawl is the same as the static one; only the page source differs.
//! Rendering goes through the [`PageRenderer`] seam. A headless Chrome
//! implementation is available with the `headless` feature.

use crate::discovery::crawl::{crawl, CrawlLimits, PageSource};
use crate::discovery::{parse_html, DiscoveredUrl, LinkClassification};
use crate::url::UrlClassifier;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Produces the HTML of a page after its scripts have run
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String>;
}

/// Crawls pages whose links are injected client-side
pub struct RenderedDiscovery {
    renderer: Arc<dyn PageRenderer>,
    classifier: UrlClassifier,
}

impl RenderedDiscovery {
    pub fn new(renderer: Arc<dyn PageRenderer>, classifier: UrlClassifier) -> Self {
        Self {
            renderer,
            classifier,
        }
    }

    pub async fn discover_recipe_urls(
        &self,
        root: &Url,
        provider_id: &str,
        limits: CrawlLimits,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredUrl>> {
        crawl(self, self, root, provider_id, limits, cancel).await
    }
}

impl LinkClassification for RenderedDiscovery {
    fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }
}

#[async_trait]
impl PageSource for RenderedDiscovery {
    async fn links(&self, url: &Url) -> Result<Vec<Url>> {
        let html = self.renderer.render(url).await?;
        Ok(parse_html(&html, url).links)
    }
}

#[cfg(feature = "headless")]
pub use chrome::ChromeRenderer;

#[cfg(feature = "headless")]
mod chrome {
    use super::PageRenderer;
    use crate::{IngestError, Result};
    use async_trait::async_trait;
    use headless_chrome::{Browser, LaunchOptions};
    use std::sync::Arc;
    use url::Url;

    /// Renders pages in a shared headless Chrome instance
    pub struct ChromeRenderer {
        browser: Arc<Browser>,
    }

    impl ChromeRenderer {
        /// Launches Chrome
        pub fn launch() -> Result<Self> {
            let mut builder = LaunchOptions::default_builder();
            builder.args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
            ]);

            let options = builder.build().map_err(|e| IngestError::Render {
                url: String::new(),
                message: format!("invalid launch options: {}", e),
            })?;

            let browser = Browser::new(options).map_err(|e| IngestError::Render {
                url: String::new(),
                message: format!("failed to launch browser: {}", e),
            })?;
            tracing::debug!("Headless browser launched");

            Ok(Self {
                browser: Arc::new(browser),
            })
        }
    }

    #[async_trait]
    impl PageRenderer for ChromeRenderer {
        async fn render(&self, url: &Url) -> Result<String> {
            let browser = self.browser.clone();
            let target = url.to_string();

            // The browser API is blocking
            let rendered = tokio::task::spawn_blocking(move || {
                let tab = browser.new_tab()?;
                tab.navigate_to(&target)?;
                tab.wait_until_navigated()?;
                let html = tab.get_content()?;
                let _ = tab.close(true);
                Ok::<String, anyhow::Error>(html)
            })
            .await
            .map_err(|e| IngestError::Render {
                url: url.to_string(),
                message: format!("render task failed: {}", e),
            })?;

            rendered.map_err(|e| IngestError::Render {
                url: url.to_string(),
                message: e.to_string(),
            })
        }
    }
}
