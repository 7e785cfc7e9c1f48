//! Session persistence and context retrieval for intel-rs
//!
//! Two concerns live here:
//!
//! - [`SessionStorage`]: durable-ish storage of analysis sessions behind a
//!   trait, with an in-memory implementation for the default deployment
//! - [`ContextRetriever`]: chunked, embedded artifact text with cosine
//!   similarity search, feeding the assistant's prompts

pub mod retriever;
pub mod store;

pub use retriever::{
    ContextFragment, ContextRetriever, Embedder, HashEmbedder, RetrievalScope, ScoredFragment,
};
pub use store::{InMemorySessionStore, JsonFileSessionStore, SessionFilter, SessionStorage};

use uuid::Uuid;

/// Delete a session and all of its indexed fragments
///
/// Returns whether the session existed. Fragments are removed even when it
/// did not, so a half-deleted session can be cleaned up by retrying.
pub async fn delete_session(
    store: &dyn SessionStorage,
    retriever: &ContextRetriever,
    id: Uuid,
) -> intel_core::Result<bool> {
    retriever.remove_session(id).await;
    store.delete(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_core::{AnalysisSession, SessionStatus, StageArtifact, StageName, StagePayload};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delete_session_cascades_to_fragments() {
        let store = InMemorySessionStore::new();
        let retriever = ContextRetriever::new(Arc::new(HashEmbedder::default()), 200, 0.0);

        let mut session = AnalysisSession::new("ai trends in healthcare", "Healthcare").unwrap();
        session.status = SessionStatus::Complete;
        session.artifacts.push(StageArtifact::succeeded(
            StageName::Formatter,
            StagePayload::Report {
                markdown: "Telehealth keeps growing".to_string(),
            },
            1,
        ));
        store.create(session.clone()).await.unwrap();
        retriever.index(&session).await;
        assert!(!retriever.is_empty().await);

        assert!(delete_session(&store, &retriever, session.id).await.unwrap());
        assert!(store.get(session.id).await.unwrap().is_none());
        assert!(retriever.is_empty().await);

        // idempotent on a second call
        assert!(!delete_session(&store, &retriever, session.id).await.unwrap());
    }
}
