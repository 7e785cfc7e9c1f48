//! The workflow state machine
//!
//! One orchestrator drives one analysis session at a time through
//! Collecting, Analyzing, Strategizing, and Formatting. It is the sole
//! writer of the session's status, checks for cancellation at every
//! transition, broadcasts progress events without ever blocking on a
//! consumer, and persists the session at each step so a terminal session
//! always retains every artifact produced before the failure point.

use crate::event::{WorkflowEvent, WorkflowState};
use crate::executor::StageExecutor;
use intel_core::{
    AnalysisSession, ArtifactStatus, IntelConfig, IntelError, Result, SessionStatus, StageName,
    StagePayload,
};
use intel_sources::DataSourceAggregator;
use intel_store::{ContextRetriever, SessionStorage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cooperative cancellation flag for an in-flight session
///
/// Checked at every state transition; the active stage is allowed to
/// finish before the session transitions to Failed.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Create a fresh, uncancelled handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives the four-stage pipeline over one session at a time
pub struct WorkflowOrchestrator {
    aggregator: Arc<DataSourceAggregator>,
    executor: StageExecutor,
    store: Arc<dyn SessionStorage>,
    retriever: Arc<ContextRetriever>,
    config: IntelConfig,
    events: broadcast::Sender<WorkflowEvent>,
    cancellation: CancellationHandle,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator over the given components
    pub fn new(
        aggregator: Arc<DataSourceAggregator>,
        executor: StageExecutor,
        store: Arc<dyn SessionStorage>,
        retriever: Arc<ContextRetriever>,
        config: IntelConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            aggregator,
            executor,
            store,
            retriever,
            config,
            events,
            cancellation: CancellationHandle::new(),
        }
    }

    /// Subscribe to progress events
    ///
    /// May be called any number of times, including never; emission drops
    /// events rather than blocking.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Handle for cancelling the in-flight run
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    /// Run a full analysis for the query
    ///
    /// Always returns the session in its terminal state; pipeline failures
    /// are recorded on the session rather than surfaced as errors. `Err` is
    /// reserved for invalid input and storage faults.
    pub async fn run(&self, query: &str, market_domain: &str) -> Result<AnalysisSession> {
        self.config.validate()?;
        let mut session = AnalysisSession::new(query, market_domain)?;
        info!(
            "Starting analysis session {} for \"{}\" in {}",
            session.id, session.query, session.market_domain
        );

        self.store.create(session.clone()).await?;
        session.status = SessionStatus::Running;
        self.store.save(session.clone()).await?;

        // Collecting: provider fan-out, then the Reader stage
        if let Some(terminal) = self.check_cancelled(&mut session).await? {
            return Ok(terminal);
        }
        self.emit(WorkflowEvent::StageEntered {
            session_id: session.id,
            stage: StageName::Reader,
        });

        match self.aggregator.collect(&session.query, &session.market_domain).await {
            Ok(evidence) => session.evidence = evidence.items,
            Err(IntelError::NoEvidenceAvailable) => {
                return self
                    .fail(session, StageName::Reader, "no provider returned usable evidence")
                    .await;
            }
            Err(e) => return Err(e),
        }
        self.store.save(session.clone()).await?;

        for stage in StageName::ALL {
            // Collecting already entered above for the Reader
            if stage != StageName::Reader {
                if let Some(terminal) = self.check_cancelled(&mut session).await? {
                    return Ok(terminal);
                }
                self.emit(WorkflowEvent::StageEntered {
                    session_id: session.id,
                    stage,
                });
            }

            let artifact = self.executor.run(stage, &session).await;
            let status = artifact.status;
            let defect = artifact.defects.first().cloned().unwrap_or_default();
            session.artifacts.push(artifact);
            self.store.save(session.clone()).await?;

            match status {
                ArtifactStatus::Succeeded => {
                    self.emit(WorkflowEvent::StageCompleted {
                        session_id: session.id,
                        stage,
                    });
                }
                ArtifactStatus::Degraded => {
                    self.emit(WorkflowEvent::StageDegraded {
                        session_id: session.id,
                        stage,
                        defect,
                    });
                }
                ArtifactStatus::Failed => {
                    self.emit(WorkflowEvent::StageFailed {
                        session_id: session.id,
                        stage,
                        reason: defect.clone(),
                    });
                    return self.fail(session, stage, &defect).await;
                }
            }
        }

        // Terminal: the Formatter's artifact decides Complete vs Partial
        let formatter = session
            .artifact(StageName::Formatter)
            .ok_or_else(|| IntelError::Store("formatter artifact missing".to_string()))?;
        let partially = formatter.status == ArtifactStatus::Degraded;
        let report = match &formatter.payload {
            Some(StagePayload::Report { markdown }) => Some(markdown.clone()),
            _ => None,
        };
        session.report = report;

        session.status = if partially {
            SessionStatus::Partial
        } else {
            SessionStatus::Complete
        };
        self.store.save(session.clone()).await?;
        self.retriever.index(&session).await;

        if partially {
            info!("Session {} partially complete", session.id);
            self.emit(WorkflowEvent::PartiallyCompleted {
                session_id: session.id,
            });
        } else {
            info!("Session {} complete", session.id);
            self.emit(WorkflowEvent::Completed {
                session_id: session.id,
            });
        }
        Ok(session)
    }

    /// Current workflow state derived from a session snapshot
    pub fn state_of(session: &AnalysisSession) -> WorkflowState {
        match session.status {
            SessionStatus::Pending => WorkflowState::Created,
            SessionStatus::Complete => WorkflowState::Complete,
            SessionStatus::Partial => WorkflowState::PartiallyComplete,
            SessionStatus::Failed => WorkflowState::Failed,
            SessionStatus::Running => match session.artifacts.len() {
                0 => WorkflowState::Collecting,
                1 => WorkflowState::Analyzing,
                2 => WorkflowState::Strategizing,
                _ => WorkflowState::Formatting,
            },
        }
    }

    async fn check_cancelled(
        &self,
        session: &mut AnalysisSession,
    ) -> Result<Option<AnalysisSession>> {
        if !self.cancellation.is_cancelled() {
            return Ok(None);
        }
        warn!("Session {} cancelled", session.id);
        session.status = SessionStatus::Failed;
        session.failure_reason = Some("cancelled by user".to_string());
        self.store.save(session.clone()).await?;
        self.emit(WorkflowEvent::Failed {
            session_id: session.id,
            reason: "cancelled by user".to_string(),
        });
        Ok(Some(session.clone()))
    }

    async fn fail(
        &self,
        mut session: AnalysisSession,
        stage: StageName,
        reason: &str,
    ) -> Result<AnalysisSession> {
        warn!("Session {} failed at {stage}: {reason}", session.id);
        session.status = SessionStatus::Failed;
        session.failure_reason = Some(format!("{stage}: {reason}"));
        self.store.save(session.clone()).await?;
        self.emit(WorkflowEvent::Failed {
            session_id: session.id,
            reason: reason.to_string(),
        });
        Ok(session)
    }

    fn emit(&self, event: WorkflowEvent) {
        // No subscribers is fine; send() only errors when no receiver exists
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intel_core::{Evidence, RetryPolicy};
    use intel_llm::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};
    use intel_sources::{DataProvider, ProviderError};
    use intel_store::{HashEmbedder, InMemorySessionStore, RetrievalScope, SessionFilter};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticProvider {
        evidence: usize,
    }

    #[async_trait]
    impl DataProvider for StaticProvider {
        fn id(&self) -> &str {
            "search"
        }

        async fn fetch(
            &self,
            _query: &str,
            _domain: &str,
        ) -> std::result::Result<Vec<Evidence>, ProviderError> {
            if self.evidence == 0 {
                return Err(ProviderError::Unrecoverable("no key".to_string()));
            }
            Ok((0..self.evidence)
                .map(|i| Evidence::ok("search", format!("item {i}"), "ML adoption rising"))
                .collect())
        }
    }

    struct ScriptedCompletions {
        replies: Mutex<VecDeque<&'static str>>,
    }

    impl ScriptedCompletions {
        fn new(replies: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletions {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> intel_llm::Result<CompletionResponse> {
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(text) => Ok(CompletionResponse {
                    text: text.to_string(),
                    model: request.model,
                    usage: TokenUsage::default(),
                }),
                None => Err(intel_llm::LlmError::RequestFailed("exhausted".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    const COLLECTION: &str =
        r#"{"key_themes": ["AI triage"], "market_signals": ["funding up"], "summary": "growing"}"#;
    const ANALYSIS: &str = r#"{
        "trends": [{"name": "AI triage", "description": "hospitals adopt ML"}],
        "opportunities": [{"name": "remote monitoring", "description": "wearables"}]
    }"#;
    const ANALYSIS_MISSING_OPPS: &str =
        r#"{"trends": [{"name": "AI triage", "description": "hospitals adopt ML"}]}"#;
    const STRATEGY: &str = r#"{
        "recommendations": [{"title": "Partner with hospitals", "description": "pilot programs"}]
    }"#;
    const REPORT: &str = "# Market Intelligence Report: Healthcare\n\n## Executive Summary\nAll good.";

    fn orchestrator(
        completions: Arc<ScriptedCompletions>,
        evidence: usize,
        store: Arc<InMemorySessionStore>,
        retriever: Arc<ContextRetriever>,
    ) -> WorkflowOrchestrator {
        let mut config = IntelConfig::default();
        config.schema_retries = 1;

        let aggregator = Arc::new(DataSourceAggregator::new(
            vec![Arc::new(StaticProvider { evidence }) as Arc<dyn DataProvider>],
            Duration::from_millis(200),
            RetryPolicy::fast(),
        ));
        let executor =
            StageExecutor::new(completions, config.clone()).with_retry_policy(RetryPolicy::fast());
        WorkflowOrchestrator::new(aggregator, executor, store, retriever, config)
    }

    fn retriever() -> Arc<ContextRetriever> {
        Arc::new(ContextRetriever::new(Arc::new(HashEmbedder::default()), 200, 0.0))
    }

    #[tokio::test]
    async fn test_happy_path_completes() {
        let completions = ScriptedCompletions::new(vec![COLLECTION, ANALYSIS, STRATEGY, REPORT]);
        let store = Arc::new(InMemorySessionStore::new());
        let retriever = retriever();
        let orch = orchestrator(completions, 2, store.clone(), retriever.clone());

        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Complete);
        assert!(session.report.is_some());
        assert_eq!(session.artifacts.len(), 4);
        assert!(session.all_stages_usable());

        // terminal session persisted and indexed
        let stored = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Complete);
        let fragments = retriever
            .retrieve("healthcare", RetrievalScope::Session(session.id), 5)
            .await;
        assert!(!fragments.is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_failed_fails_without_stage_calls() {
        let completions = ScriptedCompletions::new(vec![COLLECTION]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions.clone(), 0, store.clone(), retriever());

        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.failure_reason.is_some());
        assert!(session.artifacts.is_empty());
        // no completion call happened
        assert_eq!(completions.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_analyst_proceeds_to_strategist() {
        let completions = ScriptedCompletions::new(vec![
            COLLECTION,
            ANALYSIS_MISSING_OPPS,
            ANALYSIS_MISSING_OPPS,
            STRATEGY,
            REPORT,
        ]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions, 2, store, retriever());
        let mut events = orch.subscribe();

        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Complete);
        let analyst = session.artifact(StageName::Analyst).unwrap();
        assert_eq!(analyst.status, ArtifactStatus::Degraded);

        let mut saw_degraded = false;
        while let Ok(event) = events.try_recv() {
            if matches!(
                event,
                WorkflowEvent::StageDegraded {
                    stage: StageName::Analyst,
                    ..
                }
            ) {
                saw_degraded = true;
            }
        }
        assert!(saw_degraded);
    }

    #[tokio::test]
    async fn test_formatter_fallback_yields_partial() {
        // formatter's completion call fails; the templated fallback kicks in
        let completions = ScriptedCompletions::new(vec![COLLECTION, ANALYSIS, STRATEGY]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions, 2, store, retriever());

        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Partial);
        let report = session.report.unwrap();
        assert!(report.contains("# Market Intelligence Report"));
    }

    #[tokio::test]
    async fn test_cancellation_before_start() {
        let completions = ScriptedCompletions::new(vec![COLLECTION]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions, 2, store, retriever());

        orch.cancellation_handle().cancel();
        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure_reason.as_deref(), Some("cancelled by user"));
    }

    #[tokio::test]
    async fn test_failed_session_retains_artifacts() {
        // analyst transport failure with degradation off for strategist path:
        // replies run out after the reader succeeds
        let completions = ScriptedCompletions::new(vec![COLLECTION]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions, 2, store.clone(), retriever());

        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();

        assert_eq!(session.status, SessionStatus::Failed);
        // the reader artifact survives the analyst failure
        assert!(session.artifact(StageName::Reader).is_some());
        assert!(session.failure_reason.is_some());

        let stored = store
            .list(&SessionFilter::default())
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(stored.artifacts.len(), session.artifacts.len());
    }

    #[test]
    fn test_state_of_follows_session_progress() {
        use intel_core::StageArtifact;

        let mut session = AnalysisSession::new("ai trends in healthcare", "Healthcare").unwrap();
        assert_eq!(
            WorkflowOrchestrator::state_of(&session),
            WorkflowState::Created
        );

        session.status = SessionStatus::Running;
        assert_eq!(
            WorkflowOrchestrator::state_of(&session),
            WorkflowState::Collecting
        );

        session.artifacts.push(StageArtifact::succeeded(
            StageName::Reader,
            StagePayload::Collection {
                key_themes: vec![],
                market_signals: vec![],
                summary: "growing".to_string(),
                source_count: 1,
            },
            1,
        ));
        assert_eq!(
            WorkflowOrchestrator::state_of(&session),
            WorkflowState::Analyzing
        );

        session.status = SessionStatus::Partial;
        assert_eq!(
            WorkflowOrchestrator::state_of(&session),
            WorkflowState::PartiallyComplete
        );

        session.status = SessionStatus::Failed;
        assert_eq!(
            WorkflowOrchestrator::state_of(&session),
            WorkflowState::Failed
        );
    }

    #[tokio::test]
    async fn test_events_tolerate_no_subscribers() {
        let completions = ScriptedCompletions::new(vec![COLLECTION, ANALYSIS, STRATEGY, REPORT]);
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(completions, 2, store, retriever());

        // no subscribe() call anywhere; the run must still complete
        let session = orch.run("ai trends in healthcare", "Healthcare").await.unwrap();
        assert_eq!(session.status, SessionStatus::Complete);
    }
}
