//! Concurrent fan-out over all enabled providers
//!
//! The aggregator runs one fetch per provider in parallel, each under its
//! own timeout, and tolerates partial failure: a failed provider becomes a
//! failed evidence entry rather than sinking the whole collection. Only
//! when every provider fails does collection error out.

use crate::error::ProviderError;
use crate::provider::DataProvider;
use intel_core::{Evidence, EvidenceSet, IntelError, Result, RetryPolicy};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Fans out to data providers and merges their evidence
pub struct DataSourceAggregator {
    providers: Vec<Arc<dyn DataProvider>>,
    provider_timeout: Duration,
    retry_policy: RetryPolicy,
    /// Providers that failed unrecoverably; skipped for the rest of the run
    suppressed: Mutex<HashSet<String>>,
}

impl DataSourceAggregator {
    /// Create an aggregator over the given providers
    pub fn new(
        providers: Vec<Arc<dyn DataProvider>>,
        provider_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            providers,
            provider_timeout,
            retry_policy,
            suppressed: Mutex::new(HashSet::new()),
        }
    }

    /// Collect evidence from every non-suppressed provider concurrently
    ///
    /// Failed fetches are preserved as failed evidence entries so the
    /// session records which sources were unavailable. Errors with
    /// `NoEvidenceAvailable` only when no provider produced a single
    /// successful item.
    pub async fn collect(&self, query: &str, domain: &str) -> Result<EvidenceSet> {
        let suppressed = self.suppressed.lock().await.clone();
        let active: Vec<&Arc<dyn DataProvider>> = self
            .providers
            .iter()
            .filter(|p| {
                if suppressed.contains(p.id()) {
                    debug!("Skipping suppressed provider: {}", p.id());
                    false
                } else {
                    true
                }
            })
            .collect();

        info!(
            "Collecting evidence from {} providers for query: {query}",
            active.len()
        );

        let fetches = active
            .iter()
            .map(|provider| self.fetch_one(provider.as_ref(), query, domain));
        let outcomes = futures::future::join_all(fetches).await;

        let mut items = Vec::new();
        for (provider, outcome) in active.iter().zip(outcomes) {
            match outcome {
                Ok(evidence) => {
                    debug!("Provider {} returned {} items", provider.id(), evidence.len());
                    items.extend(evidence);
                }
                Err(e) => {
                    let unrecoverable = !e.is_transient();
                    warn!("Provider {} failed: {e}", provider.id());
                    if unrecoverable {
                        self.suppressed.lock().await.insert(provider.id().to_string());
                    }
                    items.push(Evidence::failed(provider.id(), e.to_string(), unrecoverable));
                }
            }
        }

        let set = EvidenceSet::new(items);
        if !set.has_usable_evidence() {
            return Err(IntelError::NoEvidenceAvailable);
        }

        info!(
            "Collected {} successful items ({} provider failures)",
            set.success_count(),
            set.failed().count()
        );
        Ok(set)
    }

    /// One provider fetch: per-attempt timeout, transient failures retried
    async fn fetch_one(
        &self,
        provider: &dyn DataProvider,
        query: &str,
        domain: &str,
    ) -> std::result::Result<Vec<Evidence>, ProviderError> {
        let per_attempt = self.provider_timeout;
        self.retry_policy
            .execute(
                provider.id(),
                || async move {
                    match tokio::time::timeout(per_attempt, provider.fetch(query, domain)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Transient(format!(
                            "timed out after {per_attempt:?}"
                        ))),
                    }
                },
                ProviderError::is_transient,
            )
            .await
    }

    /// Provider ids currently suppressed
    pub async fn suppressed(&self) -> HashSet<String> {
        self.suppressed.lock().await.clone()
    }
}
