//! Web scraping provider backed by the Firecrawl API
//!
//! Firecrawl's `/search` endpoint searches the web and scrapes the top
//! hits into markdown in one call, which is exactly the shape the pipeline
//! needs for long-form evidence.

use crate::error::ProviderError;
use crate::provider::DataProvider;
use async_trait::async_trait;
use intel_core::Evidence;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_SCRAPE_API_BASE: &str = "https://api.firecrawl.dev/v0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_QUERY_LEN: usize = 100;
const RESULT_LIMIT: usize = 5;

/// Scraping provider over the Firecrawl `/search` endpoint
pub struct WebScrapeProvider {
    client: Client,
    api_key: String,
    api_base: String,
}

impl WebScrapeProvider {
    /// Create a new provider with the given API key
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Unrecoverable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_SCRAPE_API_BASE.to_string(),
        })
    }

    /// Override the API base URL (used by tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl DataProvider for WebScrapeProvider {
    fn id(&self) -> &str {
        "web_scrape"
    }

    async fn fetch(&self, query: &str, domain: &str) -> Result<Vec<Evidence>, ProviderError> {
        let search_query: String = format!("{query} {domain} competitors analysis")
            .chars()
            .take(MAX_QUERY_LEN)
            .collect();

        info!("Scraping search results for: {search_query}");
        let request = ScrapeSearchRequest {
            query: &search_query,
            page_options: PageOptions {
                only_main_content: true,
                include_html: false,
            },
            search_options: SearchOptions {
                limit: RESULT_LIMIT,
            },
        };

        let response = self
            .client
            .post(format!("{}/search", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let parsed: ScrapeSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("parse scrape response: {e}")))?;

        debug!("Scrape returned {} pages", parsed.data.len());
        Ok(parsed
            .data
            .into_iter()
            .filter(|page| !page.markdown.trim().is_empty())
            .map(|page| {
                Evidence::ok(self.id(), page.title, page.markdown).with_url(page.url)
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct ScrapeSearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "pageOptions")]
    page_options: PageOptions,
    #[serde(rename = "searchOptions")]
    search_options: SearchOptions,
}

#[derive(Debug, Serialize)]
struct PageOptions {
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
    #[serde(rename = "includeHtml")]
    include_html: bool,
}

#[derive(Debug, Serialize)]
struct SearchOptions {
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct ScrapeSearchResponse {
    #[serde(default)]
    data: Vec<ScrapedPage>,
}

#[derive(Debug, Deserialize)]
struct ScrapedPage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    markdown: String,
}
