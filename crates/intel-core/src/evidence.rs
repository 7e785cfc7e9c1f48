//! Evidence collected from data providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single provider fetch
///
/// Failed fetches stay in the evidence set so downstream consumers can see
/// which providers degraded; silent omission is not allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvidenceOutcome {
    /// Provider returned usable content
    Ok,
    /// Provider failed; `unrecoverable` marks failures that must not be
    /// retried (auth, quota) and suppress the provider for the session
    Failed {
        reason: String,
        unrecoverable: bool,
    },
}

/// A unit of raw collected data from one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Provider identifier (e.g. "web_scrape", "news_feed", "search")
    pub provider: String,
    /// Item title or headline
    pub title: String,
    /// Raw content, possibly truncated by the provider
    pub content: String,
    /// Source URL if the provider reports one
    pub url: Option<String>,
    /// Provider-reported reliability, 0.0..=1.0
    pub confidence: Option<f64>,
    /// When the fetch finished
    pub fetched_at: DateTime<Utc>,
    /// Success or failure of the fetch
    pub outcome: EvidenceOutcome,
}

impl Evidence {
    /// Create a successful evidence item
    pub fn ok(
        provider: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            title: title.into(),
            content: content.into(),
            url: None,
            confidence: None,
            fetched_at: Utc::now(),
            outcome: EvidenceOutcome::Ok,
        }
    }

    /// Create a failed evidence entry with a reason code
    pub fn failed(provider: impl Into<String>, reason: impl Into<String>, unrecoverable: bool) -> Self {
        Self {
            provider: provider.into(),
            title: String::new(),
            content: String::new(),
            url: None,
            confidence: None,
            fetched_at: Utc::now(),
            outcome: EvidenceOutcome::Failed {
                reason: reason.into(),
                unrecoverable,
            },
        }
    }

    /// Set the source URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the provider-reported confidence, clamped to 0.0..=1.0
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Whether the fetch succeeded
    pub fn is_ok(&self) -> bool {
        self.outcome == EvidenceOutcome::Ok
    }
}

/// The full result of one aggregation pass: successes and failures together
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceSet {
    /// All evidence items, successful and failed
    pub items: Vec<Evidence>,
}

impl EvidenceSet {
    /// Create an evidence set from collected items
    pub fn new(items: Vec<Evidence>) -> Self {
        Self { items }
    }

    /// Iterate over successful items only
    pub fn successful(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter().filter(|e| e.is_ok())
    }

    /// Iterate over failed entries only
    pub fn failed(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter().filter(|e| !e.is_ok())
    }

    /// Number of successful items
    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    /// Whether at least one provider returned usable evidence
    pub fn has_usable_evidence(&self) -> bool {
        self.items.iter().any(Evidence::is_ok)
    }

    /// Provider ids that failed unrecoverably during this pass
    pub fn suppressed_providers(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    EvidenceOutcome::Failed {
                        unrecoverable: true,
                        ..
                    }
                )
            })
            .map(|e| e.provider.clone())
            .collect()
    }
}
