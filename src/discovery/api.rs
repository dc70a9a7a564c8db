use crate::discovery::{fetch_json, DiscoveredUrl, LinkClassification};
use crate::url::UrlClassifier;
use crate::{IngestError, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Item fields checked for a recipe URL, in order
const URL_FIELDS: &[&str] = &["url", "link", "href", "permalink", "slug"];

/// Item fields copied into the discovered URL's metadata
const METADATA_FIELDS: &[&str] = &["id", "title", "name"];

/// Reads recipe URLs from a single JSON endpoint
pub struct ApiDiscovery {
    client: Client,
    classifier: UrlClassifier,
}

impl ApiDiscovery {
    pub fn new(client: Client, classifier: UrlClassifier) -> Self {
        Self { client, classifier }
    }

    /// Fetches `endpoint` and extracts one URL per recipe item
    ///
    /// Items without a usable URL are skipped. A response without a
    /// recognisable recipe array is malformed content.
    pub async fn discover_recipe_urls(
        &self,
        endpoint: &Url,
        provider_id: &str,
        max_urls: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredUrl>> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            body = fetch_json(&self.client, endpoint) => body?,
        };

        let items = locate_recipe_array(&body).ok_or_else(|| IngestError::MalformedContent {
            url: endpoint.to_string(),
            message: "no recipe array under recipes, data.recipes, items or top level"
                .to_string(),
        })?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for item in items {
            if results.len() >= max_urls {
                break;
            }

            let Some(url) = item_url(item, endpoint) else {
                tracing::debug!(provider = provider_id, "Skipping API item without URL");
                continue;
            };
            if !seen.insert(url.to_string()) {
                continue;
            }

            results.push(DiscoveredUrl {
                url: url.to_string(),
                provider_id: provider_id.to_string(),
                discovered_from: endpoint.to_string(),
                depth: 0,
                confidence: self.link_confidence(&url),
                metadata: item_metadata(item),
            });
        }

        tracing::debug!(
            provider = provider_id,
            endpoint = %endpoint,
            found = results.len(),
            "API discovery finished"
        );
        Ok(results)
    }
}

impl LinkClassification for ApiDiscovery {
    fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    fn link_confidence(&self, url: &Url) -> f64 {
        if url.path().to_lowercase().contains("/recipe/") {
            0.95
        } else {
            0.8
        }
    }
}

fn locate_recipe_array(body: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items);
    }

    body.get("recipes")
        .and_then(Value::as_array)
        .or_else(|| body.get("data").and_then(|d| d.get("recipes")).and_then(Value::as_array))
        .or_else(|| body.get("items").and_then(Value::as_array))
}

fn item_url(item: &Value, endpoint: &Url) -> Option<Url> {
    let (field, value) = URL_FIELDS.iter().find_map(|field| {
        item.get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (*field, v))
    })?;

    if field == "slug" {
        let mut url = endpoint.clone();
        url.set_path(&format!("/recipe/{}", value.trim_matches('/')));
        url.set_query(None);
        url.set_fragment(None);
        return Some(url);
    }

    let url = endpoint.join(value).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn item_metadata(item: &Value) -> BTreeMap<String, String> {
    METADATA_FIELDS
        .iter()
        .filter_map(|field| {
            let value = item.get(*field)?;
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((field.to_string(), text))
        })
        .collect()
}
