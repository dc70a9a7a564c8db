//! Breadth-first link crawl shared by the static and rendered strategies

use crate::discovery::{DiscoveredUrl, LinkClassification};
use crate::url::{same_site, LinkKind};
use crate::{IngestError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where a crawl gets the links of a page from
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Absolute links of the page at `url`
    async fn links(&self, url: &Url) -> Result<Vec<Url>>;
}

/// Limits of one crawl
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    /// Deepest category page that is still fetched; the root is depth 0
    pub max_depth: u32,
    pub max_urls: usize,
}

/// Crawls from `root`, following category links and emitting recipe links
///
/// Links found on a page at depth `d` have depth `d + 1`. Only links on the
/// root's site are considered. A failure fetching the root is returned; a
/// failure fetching a deeper page abandons that branch.
pub async fn crawl<S, C>(
    source: &S,
    classification: &C,
    root: &Url,
    provider_id: &str,
    limits: CrawlLimits,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredUrl>>
where
    S: PageSource + ?Sized,
    C: LinkClassification + ?Sized,
{
    let mut results = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(Url, u32)> = VecDeque::new();

    visited.insert(root.to_string());
    queue.push_back((root.clone(), 0));

    while let Some((page, depth)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        if results.len() >= limits.max_urls {
            break;
        }

        let links = match source.links(&page).await {
            Ok(links) => links,
            Err(e) if depth == 0 => return Err(e),
            Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    provider = provider_id,
                    url = %page,
                    depth,
                    "Skipping branch after fetch failure: {}",
                    e
                );
                continue;
            }
        };

        tracing::debug!(
            provider = provider_id,
            url = %page,
            depth,
            links = links.len(),
            "Crawled page"
        );

        let link_depth = depth + 1;
        for link in links {
            if results.len() >= limits.max_urls {
                break;
            }
            if !same_site(root, &link) || !visited.insert(link.to_string()) {
                continue;
            }

            match classification.classify_link(&link) {
                LinkKind::Recipe => {
                    let confidence = classification.link_confidence(&link);
                    results.push(DiscoveredUrl {
                        url: link.to_string(),
                        provider_id: provider_id.to_string(),
                        discovered_from: page.to_string(),
                        depth: link_depth,
                        confidence,
                        metadata: BTreeMap::new(),
                    });
                }
                LinkKind::Category if link_depth <= limits.max_depth => {
                    queue.push_back((link, link_depth));
                }
                LinkKind::Category | LinkKind::Irrelevant => {}
            }
        }
    }

    Ok(results)
}
