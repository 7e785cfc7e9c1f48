//! Provider trait for evidence sources

use crate::error::ProviderError;
use async_trait::async_trait;
use intel_core::Evidence;

/// A single market data source
///
/// Implementations wrap one upstream API (search engine, news feed,
/// scraper). Providers are shared across tasks via `Arc<dyn DataProvider>`
/// and must not hold request state between calls.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Stable identifier used in config, logs, and suppression sets
    fn id(&self) -> &str;

    /// Fetch evidence for the given query within a market domain
    ///
    /// Returns successful items only; failures surface as `ProviderError`
    /// and the aggregator records them as failed evidence entries.
    async fn fetch(&self, query: &str, domain: &str) -> Result<Vec<Evidence>, ProviderError>;
}
