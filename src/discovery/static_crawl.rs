use crate::discovery::crawl::{crawl, CrawlLimits, PageSource};
use crate::discovery::{fetch_page, parse_html, DiscoveredUrl, LinkClassification};
use crate::url::UrlClassifier;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Crawls raw HTML as served
pub struct StaticDiscovery {
    client: Client,
    classifier: UrlClassifier,
}

impl StaticDiscovery {
    pub fn new(client: Client, classifier: UrlClassifier) -> Self {
        Self { client, classifier }
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

impl LinkClassification for StaticDiscovery {
    fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }
}

#[async_trait]
impl PageSource for StaticDiscovery {
    async fn links(&self, url: &Url) -> Result<Vec<Url>> {
        let page = fetch_page(&self.client, url).await?;
        Ok(parse_html(&page.body, &page.final_url).links)
    }
}
