//! News feed provider backed by the NewsData.io API
//!
//! NewsData.io rejects queries containing most punctuation and caps query
//! length, so raw user queries are sanitized before hitting the wire. The
//! free tier is tightly rate limited; a governor limiter spaces requests
//! out instead of sleeping between them.

use crate::error::ProviderError;
use crate::provider::DataProvider;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use intel_core::Evidence;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const DEFAULT_NEWS_API_BASE: &str = "https://newsdata.io/api/1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_QUERY_LEN: usize = 80;
const PAGE_SIZE: usize = 10;
const DEFAULT_RATE_LIMIT: NonZeroU32 = NonZeroU32::new(30).expect("nonzero literal");

/// News provider over the NewsData.io `/latest` endpoint
pub struct NewsFeedProvider {
    client: Client,
    api_key: String,
    api_base: String,
    rate_limiter: SharedRateLimiter,
    sanitizer: Regex,
}

impl NewsFeedProvider {
    /// Create a new provider with rate limiting
    ///
    /// # Arguments
    /// * `api_key` - NewsData.io API key
    /// * `rate_limit` - Requests per minute (free tier: 30)
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Result<Self, ProviderError> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(DEFAULT_RATE_LIMIT));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Unrecoverable(format!("HTTP client: {e}")))?;

        let sanitizer = Regex::new(r"[^\w\s-]")
            .map_err(|e| ProviderError::Unrecoverable(format!("sanitizer regex: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_NEWS_API_BASE.to_string(),
            rate_limiter,
            sanitizer,
        })
    }

    /// Override the API base URL (used by tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Strip characters the API rejects, collapse whitespace, cap length
    fn sanitize_query(&self, query: &str) -> String {
        let cleaned = self.sanitizer.replace_all(query.trim(), " ");
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().take(MAX_QUERY_LEN).collect()
    }

    async fn latest(&self, query: &str) -> Result<Vec<NewsArticle>, ProviderError> {
        self.rate_limiter.until_ready().await;

        info!("Fetching news for: {query}");
        let response = self
            .client
            .get(format!("{}/latest", self.api_base))
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("q", query),
                ("language", "en"),
                ("size", &PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let parsed: NewsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("parse news response: {e}")))?;

        if parsed.status != "success" {
            return Err(ProviderError::Transient(format!(
                "news API status: {}",
                parsed.status
            )));
        }

        debug!("News feed returned {} articles", parsed.results.len());
        Ok(parsed.results)
    }
}

#[async_trait]
impl DataProvider for NewsFeedProvider {
    fn id(&self) -> &str {
        "news_feed"
    }

    async fn fetch(&self, query: &str, domain: &str) -> Result<Vec<Evidence>, ProviderError> {
        let full_query = self.sanitize_query(&format!("{query} {domain}"));
        let mut articles = self.latest(&full_query).await?;

        // Narrow queries often return nothing; fall back to the domain alone
        if articles.is_empty() {
            let broader = self.sanitize_query(domain);
            if !broader.is_empty() && broader != full_query {
                warn!("No articles for '{full_query}', retrying with broader query '{broader}'");
                articles = self.latest(&broader).await?;
            }
        }

        Ok(articles
            .into_iter()
            .filter(|a| !a.title.trim().is_empty() || !a.description.trim().is_empty())
            .map(|a| {
                let content = if a.content.trim().is_empty() {
                    a.description
                } else {
                    a.content
                };
                let mut evidence = Evidence::ok(self.id(), a.title, content);
                if !a.link.is_empty() {
                    evidence = evidence.with_url(a.link);
                }
                evidence
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    status: String,
    #[serde(default)]
    results: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> NewsFeedProvider {
        NewsFeedProvider::new("test-key", 30).unwrap()
    }

    #[test]
    fn test_provider_id() {
        assert_eq!(provider().id(), "news_feed");
    }

    #[test]
    fn test_zero_rate_limit_falls_back_to_default() {
        let p = NewsFeedProvider::new("test-key", 0).unwrap();
        assert_eq!(p.id(), "news_feed");
    }

    #[test]
    fn test_sanitize_strips_punctuation() {
        let p = provider();
        assert_eq!(
            p.sanitize_query("EV batteries: \"solid-state\"?"),
            "EV batteries solid-state"
        );
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        let p = provider();
        assert_eq!(p.sanitize_query("  a   b\t c  "), "a b c");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let p = provider();
        let long = "x".repeat(200);
        assert_eq!(p.sanitize_query(&long).len(), MAX_QUERY_LEN);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"status": "success", "results": [
            {"title": "t", "description": "d", "content": "c", "link": "https://x.example"},
            {"title": "only title"}
        ]}"#;
        let parsed: NewsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, "success");
        assert_eq!(parsed.results.len(), 2);
        assert!(parsed.results[1].content.is_empty());
    }
}
