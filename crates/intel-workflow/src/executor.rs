//! Uniform stage execution lifecycle
//!
//! Every stage runs the same way: validate input, invoke the model (with
//! transport retries), validate the output schema (with corrective
//! re-invocations), then emit an artifact. Stages differ only in the
//! strategy functions from [`crate::stage`] and in their degradation
//! policy.

use crate::stage;
use intel_core::{AnalysisSession, IntelConfig, RetryPolicy, StageArtifact, StageName};
use intel_llm::{CompletionProvider, LlmError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs a single stage against the completion provider
pub struct StageExecutor {
    provider: Arc<dyn CompletionProvider>,
    config: IntelConfig,
    retry_policy: RetryPolicy,
}

impl StageExecutor {
    /// Create an executor; retry behavior derives from the config
    pub fn new(provider: Arc<dyn CompletionProvider>, config: IntelConfig) -> Self {
        let retry_policy = RetryPolicy {
            max_retries: config.max_retries,
            initial_backoff: config.retry_backoff_base,
            ..RetryPolicy::default()
        };
        Self {
            provider,
            config,
            retry_policy,
        }
    }

    /// Override the transport retry policy (used by tests)
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Execute one stage and emit its artifact
    ///
    /// Never panics and never returns an error: every failure mode is
    /// encoded in the artifact's status so the orchestrator can apply its
    /// per-stage policy.
    pub async fn run(&self, stage: StageName, session: &AnalysisSession) -> StageArtifact {
        if let Err(reason) = stage::validate_input(stage, session) {
            warn!("{stage} input validation failed: {reason}");
            return StageArtifact::failed(stage, 0, format!("input validation: {reason}"));
        }

        let mut last_defect: Option<String> = None;
        let mut last_text = String::new();

        for attempt in 0..=self.config.schema_retries {
            let attempts = attempt + 1;
            let request = stage::build_request(
                stage,
                session,
                &self.config.model,
                self.config.max_tokens,
                self.config.temperature,
                last_defect.as_deref(),
            );

            debug!("Invoking {stage} (attempt {attempts})");
            let response = self
                .retry_policy
                .execute(
                    stage.as_str(),
                    || {
                        let request = request.clone();
                        async move { self.provider.complete(request).await }
                    },
                    LlmError::is_retryable,
                )
                .await;

            let text = match response {
                Ok(response) => response.text,
                Err(e) => {
                    warn!("{stage} transport failure after retries: {e}");
                    // The Formatter prefers a templated report over failing
                    if stage == StageName::Formatter && self.config.degradation.formatter {
                        return StageArtifact::degraded(
                            stage,
                            stage::fallback_report(session),
                            attempts,
                            format!("transport failure, fell back to template: {e}"),
                        );
                    }
                    return StageArtifact::failed(stage, attempts, format!("transport: {e}"));
                }
            };

            match stage::parse_output(stage, &text, session) {
                Ok(payload) => {
                    info!("{stage} succeeded on attempt {attempts}");
                    return StageArtifact::succeeded(stage, payload, attempts);
                }
                Err(defect) => {
                    warn!("{stage} schema check failed on attempt {attempts}: {defect}");
                    last_defect = Some(defect);
                    last_text = text;
                }
            }
        }

        let attempts = self.config.schema_retries + 1;
        let defect = last_defect.unwrap_or_else(|| "schema validation failed".to_string());

        if self.degradation_enabled(stage) {
            info!("{stage} degrading with best-effort payload: {defect}");
            StageArtifact::degraded(
                stage,
                stage::salvage_output(stage, &last_text, session),
                attempts,
                defect,
            )
        } else {
            StageArtifact::failed(stage, attempts, format!("schema violation: {defect}"))
        }
    }

    /// Whether the stage may emit a degraded artifact instead of failing
    ///
    /// The Reader always degrades on schema trouble since a partial
    /// collection is still a usable input; the rest follow config.
    fn degradation_enabled(&self, stage: StageName) -> bool {
        match stage {
            StageName::Reader => true,
            StageName::Analyst => self.config.degradation.analyst,
            StageName::Strategist => self.config.degradation.strategist,
            StageName::Formatter => self.config.degradation.formatter,
        }
    }
}
