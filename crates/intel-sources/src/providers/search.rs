//! Web search provider backed by the Tavily API
//!
//! Tavily runs an agent-oriented search endpoint that returns page excerpts
//! alongside URLs, so a single call yields usable evidence without a
//! follow-up scrape. Responses are cached by query to keep repeat analyses
//! cheap.

use crate::cache::ResponseCache;
use crate::error::ProviderError;
use crate::provider::DataProvider;
use async_trait::async_trait;
use intel_core::Evidence;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_SEARCH_API_BASE: &str = "https://api.tavily.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_RESULTS: usize = 20;

/// Search provider over the Tavily `/search` endpoint
pub struct WebSearchProvider {
    client: Client,
    api_key: String,
    api_base: String,
    cache: ResponseCache,
}

impl WebSearchProvider {
    /// Create a new provider with the given API key
    pub fn new(api_key: impl Into<String>, cache: ResponseCache) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Unrecoverable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_SEARCH_API_BASE.to_string(),
            cache,
        })
    }

    /// Override the API base URL (used by tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        if let Some(cached) = self.cache.get("search", query).await {
            debug!("Search cache hit for query: {query}");
            let results: Vec<SearchResult> = serde_json::from_value(cached)
                .map_err(|e| ProviderError::Transient(format!("cache decode: {e}")))?;
            return Ok(results);
        }

        info!("Searching for: {query}");
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            include_answer: false,
            max_results: MAX_RESULTS,
        };

        let response = self
            .client
            .post(format!("{}/search", self.api_base))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("parse search response: {e}")))?;

        if let Ok(value) = serde_json::to_value(&parsed.results) {
            self.cache.insert("search", query, value).await;
        }

        debug!("Search returned {} results", parsed.results.len());
        Ok(parsed.results)
    }
}

#[async_trait]
impl DataProvider for WebSearchProvider {
    fn id(&self) -> &str {
        "search"
    }

    async fn fetch(&self, query: &str, domain: &str) -> Result<Vec<Evidence>, ProviderError> {
        let search_query = format!("{query} {domain} news trends");
        let results = self.search(&search_query).await?;

        Ok(results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| {
                let mut evidence = Evidence::ok(self.id(), r.title, r.content).with_url(r.url);
                if let Some(score) = r.score {
                    evidence = evidence.with_confidence(score);
                }
                evidence
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}
