use crate::config::UserAgentConfig;
use crate::discovery::{build_http_client, extract_recipe_ingredients, fetch_page, parse_html};
use crate::providers::ProviderConfiguration;
use crate::saga::FingerprintedUrl;
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use url::Url;

/// What processing one recipe URL produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedRecipe {
    pub title: Option<String>,
    /// Raw ingredient codes for normalization
    pub ingredient_codes: Vec<String>,
}

/// Fetches and processes a single recipe URL
#[async_trait]
pub trait RecipeProcessor: Send + Sync {
    async fn process(
        &self,
        item: &FingerprintedUrl,
        provider: &ProviderConfiguration,
    ) -> Result<ProcessedRecipe>;
}

/// Fetches the recipe page over HTTP
///
/// Reports the page title and any JSON-LD `recipeIngredient` entries.
/// Clients are built per request timeout and reused.
pub struct HttpRecipeProcessor {
    user_agent: UserAgentConfig,
    clients: DashMap<u32, Client>,
}

impl HttpRecipeProcessor {
    pub fn new(user_agent: UserAgentConfig) -> Self {
        Self {
            user_agent,
            clients: DashMap::new(),
        }
    }

    fn client(&self, provider: &ProviderConfiguration) -> Result<Client> {
        let key = provider.request_timeout_seconds;
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.user_agent, provider.request_timeout())?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl RecipeProcessor for HttpRecipeProcessor {
    async fn process(
        &self,
        item: &FingerprintedUrl,
        provider: &ProviderConfiguration,
    ) -> Result<ProcessedRecipe> {
        let url = Url::parse(&item.url)?;
        let client = self.client(provider)?;

        let page = fetch_page(&client, &url).await?;
        let parsed = parse_html(&page.body, &page.final_url);

        Ok(ProcessedRecipe {
            title: parsed.title,
            ingredient_codes: extract_recipe_ingredients(&page.body),
        })
    }
}
