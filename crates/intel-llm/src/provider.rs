//! Provider trait for LLM implementations

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;
use async_trait::async_trait;

/// Trait for LLM providers
///
/// Implementations wrap a concrete model API (Groq, OpenAI-compatible
/// servers) behind a uniform completion call. Providers must be cheap to
/// share across tasks via `Arc<dyn CompletionProvider>`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send a completion request and await the model's response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Short identifier for logging (e.g. "groq")
    fn name(&self) -> &str;
}
