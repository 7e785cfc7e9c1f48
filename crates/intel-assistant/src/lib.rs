//! Retrieval-grounded follow-up assistant
//!
//! After the pipeline has produced reports, this crate answers follow-up
//! questions against them. A bounded conversation history and the context
//! retriever feed a fast chat model; when nothing relevant is indexed the
//! assistant answers from general knowledge instead of erroring.
//!
//! # Example
//!
//! ```rust,no_run
//! use intel_assistant::AssistantSession;
//! use intel_core::IntelConfig;
//! use intel_llm::GroqProvider;
//! use intel_store::{ContextRetriever, HashEmbedder, RetrievalScope};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(GroqProvider::from_env()?);
//! let retriever = Arc::new(ContextRetriever::new(Arc::new(HashEmbedder::default()), 1000, 0.0));
//! let config = IntelConfig::default();
//!
//! let mut assistant =
//!     AssistantSession::new(provider, retriever, config, RetrievalScope::AllSessions);
//! let answer = assistant.ask("What changed in telehealth this quarter?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod conversation;

pub use assistant::AssistantSession;
pub use conversation::{ConversationHistory, ConversationTurn, TurnRole};
