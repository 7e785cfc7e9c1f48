//! Configuration surface for the workflow engine

use crate::error::{IntelError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-stage degradation fallback toggles
///
/// Reader has no toggle: it is fatal on failure because nothing downstream
/// has another input source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DegradationToggles {
    /// Allow the Analyst to emit a best-effort partial payload
    pub analyst: bool,
    /// Allow the Strategist to emit a best-effort partial payload
    pub strategist: bool,
    /// Allow the Formatter to fall back to the minimal templated summary
    pub formatter: bool,
}

impl Default for DegradationToggles {
    fn default() -> Self {
        Self {
            analyst: true,
            strategist: true,
            formatter: true,
        }
    }
}

/// Configuration for workflow execution, consumed (not owned) by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Provider ids to fan out to during collection
    pub enabled_providers: Vec<String>,

    /// Independent timeout applied to each provider fetch
    pub provider_timeout: Duration,

    /// Timeout for each reasoning invocation
    pub request_timeout: Duration,

    /// Maximum retries after the first attempt, for transient failures
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Corrective re-invocations allowed on a schema violation
    pub schema_retries: u32,

    /// Per-stage degradation fallbacks
    pub degradation: DegradationToggles,

    /// Conversation history cap for assistant sessions
    pub history_cap: usize,

    /// Number of fragments returned per retrieval
    pub retrieval_k: usize,

    /// Minimum cosine similarity for a fragment to be returned
    pub similarity_threshold: f32,

    /// Maximum characters per indexed context fragment
    pub fragment_chunk_size: usize,

    /// Model used by the pipeline stages
    pub model: String,

    /// Fast model used by the assistant
    pub chat_model: String,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            enabled_providers: vec![
                "search".to_string(),
                "news_feed".to_string(),
                "web_scrape".to_string(),
            ],
            provider_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff_base: Duration::from_secs(1),
            schema_retries: 2,
            degradation: DegradationToggles::default(),
            history_cap: 50,
            retrieval_k: 5,
            similarity_threshold: 0.0,
            fragment_chunk_size: 1000,
            model: "llama-3.3-70b-versatile".to_string(),
            chat_model: "llama-3.1-8b-instant".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl IntelConfig {
    /// Create a new configuration builder
    pub fn builder() -> IntelConfigBuilder {
        IntelConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled_providers.is_empty() {
            return Err(IntelError::Config(
                "at least one provider must be enabled".to_string(),
            ));
        }
        if self.retrieval_k == 0 {
            return Err(IntelError::Config(
                "retrieval_k must be greater than 0".to_string(),
            ));
        }
        if self.history_cap == 0 {
            return Err(IntelError::Config(
                "history_cap must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(IntelError::Config(
                "similarity_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for IntelConfig
#[derive(Debug, Default)]
pub struct IntelConfigBuilder {
    enabled_providers: Option<Vec<String>>,
    provider_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    schema_retries: Option<u32>,
    degradation: Option<DegradationToggles>,
    history_cap: Option<usize>,
    retrieval_k: Option<usize>,
    similarity_threshold: Option<f32>,
    fragment_chunk_size: Option<usize>,
    model: Option<String>,
    chat_model: Option<String>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl IntelConfigBuilder {
    /// Set the enabled provider ids
    pub fn enabled_providers(mut self, providers: Vec<String>) -> Self {
        self.enabled_providers = Some(providers);
        self
    }

    /// Set the per-provider fetch timeout
    pub fn provider_timeout(mut self, duration: Duration) -> Self {
        self.provider_timeout = Some(duration);
        self
    }

    /// Set the reasoning invocation timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the transient-failure retry bound
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    /// Set the corrective retry bound for schema violations
    pub fn schema_retries(mut self, retries: u32) -> Self {
        self.schema_retries = Some(retries);
        self
    }

    /// Set the degradation toggles
    pub fn degradation(mut self, toggles: DegradationToggles) -> Self {
        self.degradation = Some(toggles);
        self
    }

    /// Set the conversation history cap
    pub fn history_cap(mut self, cap: usize) -> Self {
        self.history_cap = Some(cap);
        self
    }

    /// Set how many fragments a retrieval returns
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = Some(k);
        self
    }

    /// Set the similarity threshold
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Set the fragment chunk size
    pub fn fragment_chunk_size(mut self, size: usize) -> Self {
        self.fragment_chunk_size = Some(size);
        self
    }

    /// Set the pipeline model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the assistant model
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Set max tokens per completion
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<IntelConfig> {
        let defaults = IntelConfig::default();

        let config = IntelConfig {
            enabled_providers: self.enabled_providers.unwrap_or(defaults.enabled_providers),
            provider_timeout: self.provider_timeout.unwrap_or(defaults.provider_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self
                .retry_backoff_base
                .unwrap_or(defaults.retry_backoff_base),
            schema_retries: self.schema_retries.unwrap_or(defaults.schema_retries),
            degradation: self.degradation.unwrap_or(defaults.degradation),
            history_cap: self.history_cap.unwrap_or(defaults.history_cap),
            retrieval_k: self.retrieval_k.unwrap_or(defaults.retrieval_k),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            fragment_chunk_size: self
                .fragment_chunk_size
                .unwrap_or(defaults.fragment_chunk_size),
            model: self.model.unwrap_or(defaults.model),
            chat_model: self.chat_model.unwrap_or(defaults.chat_model),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IntelConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retrieval_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = IntelConfig::builder()
            .max_retries(5)
            .retrieval_k(10)
            .history_cap(20)
            .provider_timeout(Duration::from_secs(10))
            .build()
            .expect("valid config");

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retrieval_k, 10);
        assert_eq!(config.history_cap, 20);
        assert_eq!(config.provider_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_empty_providers() {
        let result = IntelConfig::builder().enabled_providers(vec![]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_k() {
        let result = IntelConfig::builder().retrieval_k(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_threshold() {
        let result = IntelConfig::builder().similarity_threshold(1.5).build();
        assert!(result.is_err());
    }
}
