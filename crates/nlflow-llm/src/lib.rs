//! Completion client used by the nlflow normalizer's LLM fallback.
//!
//! - **[`client`]** -- [`LlmClient`] for OpenAI-compatible and Ollama
//!   endpoints, plus the [`CompletionBackend`] trait the normalizer depends
//!   on.
//! - **[`types`]** -- request and message types.
//! - **[`error`]** -- [`LlmError`].

pub mod client;
pub mod error;
pub mod types;

pub use client::{
    CompletionBackend, LlmClient, LlmClientConfig, LlmProvider, OLLAMA_BASE_URL,
    OLLAMA_DEFAULT_MODEL, OPENAI_BASE_URL,
};
pub use error::{LlmError, Result};
pub use types::{CompletionRequest, Message, Role};
