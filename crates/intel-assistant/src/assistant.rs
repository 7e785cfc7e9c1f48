//! The follow-up assistant
//!
//! Answers questions about stored analysis sessions by composing retrieved
//! context fragments with recent conversation history into a single chat
//! completion. An empty retrieval result is not an error; the assistant
//! falls back to answering from general knowledge and says so in the
//! system preamble.

use crate::conversation::{ConversationHistory, ConversationTurn, TurnRole};
use intel_core::{IntelConfig, IntelError, Result};
use intel_llm::{CompletionProvider, CompletionRequest, Message};
use intel_store::{ContextRetriever, RetrievalScope};
use std::sync::Arc;
use tracing::debug;

const GROUNDED_PREAMBLE: &str = "You are a market intelligence assistant. \
Answer the user's question using the research excerpts below. \
Cite the excerpts where relevant and say so when they do not cover the question.";

const GENERAL_PREAMBLE: &str = "You are a market intelligence assistant. \
No stored research matches this question, so answer from general knowledge \
and make clear that the answer is not grounded in collected data.";

/// How many recent turns are replayed into each completion
const CONTEXT_TURNS: usize = 6;

/// A retrieval-grounded conversation over stored analysis sessions
pub struct AssistantSession {
    provider: Arc<dyn CompletionProvider>,
    retriever: Arc<ContextRetriever>,
    config: IntelConfig,
    scope: RetrievalScope,
    history: ConversationHistory,
}

impl AssistantSession {
    /// Create a session scoped to the given retrieval scope
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        retriever: Arc<ContextRetriever>,
        config: IntelConfig,
        scope: RetrievalScope,
    ) -> Self {
        let history = ConversationHistory::new(config.history_cap);
        Self {
            provider,
            retriever,
            config,
            scope,
            history,
        }
    }

    /// Ask a question and record both turns in the history
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(IntelError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        let fragments = self
            .retriever
            .retrieve(question, self.scope, self.config.retrieval_k)
            .await;
        debug!("Retrieved {} context fragments", fragments.len());

        let request = self.build_request(question, &fragments);
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| IntelError::StageTransport {
                stage: "assistant".to_string(),
                detail: e.to_string(),
            })?;

        self.history.append(ConversationTurn::user(question));
        self.history
            .append(ConversationTurn::assistant(&response.text));
        Ok(response.text)
    }

    /// Recorded turns, oldest first
    pub fn history(&self, max_turns: usize) -> Vec<ConversationTurn> {
        self.history
            .recent(max_turns)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Discard the conversation so far
    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn build_request(
        &self,
        question: &str,
        fragments: &[intel_store::ScoredFragment],
    ) -> CompletionRequest {
        let system = if fragments.is_empty() {
            GENERAL_PREAMBLE.to_string()
        } else {
            let mut system = String::from(GROUNDED_PREAMBLE);
            system.push_str("\n\nresearch excerpts:\n");
            for (i, scored) in fragments.iter().enumerate() {
                system.push_str(&format!("[{}] {}\n", i + 1, scored.fragment.text));
            }
            system
        };

        let mut builder = CompletionRequest::builder(&self.config.chat_model)
            .system(system)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature);

        for turn in self.history.recent(CONTEXT_TURNS) {
            let message = match turn.role {
                TurnRole::User => Message::user(&turn.text),
                TurnRole::Assistant => Message::assistant(&turn.text),
            };
            builder = builder.add_message(message);
        }

        builder.add_message(Message::user(question)).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intel_core::{AnalysisSession, SessionStatus, StageArtifact, StageName, StagePayload};
    use intel_llm::{CompletionResponse, Role, TokenUsage};
    use intel_store::HashEmbedder;
    use std::sync::Mutex;

    struct EchoProvider {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl EchoProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> intel_llm::Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CompletionResponse {
                text: "the market is growing".to_string(),
                model: request.model,
                usage: TokenUsage::default(),
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn retriever() -> Arc<ContextRetriever> {
        Arc::new(ContextRetriever::new(Arc::new(HashEmbedder::default()), 200, 0.0))
    }

    fn session(
        provider: Arc<EchoProvider>,
        retriever: Arc<ContextRetriever>,
    ) -> AssistantSession {
        AssistantSession::new(
            provider,
            retriever,
            IntelConfig::default(),
            RetrievalScope::AllSessions,
        )
    }

    async fn index_report(retriever: &ContextRetriever) {
        let mut analysis = AnalysisSession::new("ai trends in healthcare", "Healthcare").unwrap();
        analysis.status = SessionStatus::Complete;
        analysis.artifacts.push(StageArtifact::succeeded(
            StageName::Formatter,
            StagePayload::Report {
                markdown: "Telehealth adoption keeps accelerating across providers".to_string(),
            },
            1,
        ));
        retriever.index(&analysis).await;
    }

    #[tokio::test]
    async fn test_ask_records_both_turns() {
        let provider = EchoProvider::new();
        let mut assistant = session(provider, retriever());

        let answer = assistant.ask("what is happening in telehealth?").await.unwrap();

        assert_eq!(answer, "the market is growing");
        let history = assistant.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn test_empty_index_uses_general_preamble() {
        let provider = EchoProvider::new();
        let mut assistant = session(provider.clone(), retriever());

        assistant.ask("what is happening in telehealth?").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.contains("general knowledge"));
    }

    #[tokio::test]
    async fn test_retrieved_fragments_land_in_preamble() {
        let provider = EchoProvider::new();
        let retriever = retriever();
        index_report(&retriever).await;
        let mut assistant = session(provider.clone(), retriever);

        assistant.ask("telehealth adoption providers").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.contains("Telehealth adoption"));
    }

    #[tokio::test]
    async fn test_history_replayed_into_later_requests() {
        let provider = EchoProvider::new();
        let mut assistant = session(provider.clone(), retriever());

        assistant.ask("first question").await.unwrap();
        assistant.ask("second question").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let second = &requests[1];
        assert!(second
            .messages
            .iter()
            .any(|m| m.role == Role::User && m.content == "first question"));
        assert!(second
            .messages
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == "the market is growing"));
        assert_eq!(second.messages.last().unwrap().content, "second question");
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let provider = EchoProvider::new();
        let mut assistant = session(provider, retriever());

        let result = assistant.ask("   ").await;
        assert!(matches!(result, Err(IntelError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_clear_resets_history() {
        let provider = EchoProvider::new();
        let mut assistant = session(provider, retriever());

        assistant.ask("first question").await.unwrap();
        assistant.clear();
        assert!(assistant.history(10).is_empty());
    }
}
