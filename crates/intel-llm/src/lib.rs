//! LLM provider abstraction layer for intel-rs
//!
//! This crate provides provider-agnostic abstractions for interacting with
//! Large Language Models (LLMs). It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types
//! - Provider trait for LLM implementations
//! - Concrete provider implementations (Groq and OpenAI-compatible APIs)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;

// Re-export main types
pub use completion::{CompletionRequest, CompletionRequestBuilder, CompletionResponse, TokenUsage};
pub use error::{LlmError, Result};
pub use messages::{Message, Role};
pub use provider::CompletionProvider;
pub use providers::{GroqConfig, GroqProvider};
