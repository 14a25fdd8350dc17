//! LLM client error types.

/// Errors raised while talking to a completion provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// An HTTP request to the provider failed or returned a non-2xx status.
    #[error("llm request failed: {reason}")]
    RequestFailed { reason: String },

    /// The provider response could not be parsed.
    #[error("llm response parse error: {reason}")]
    ParseFailed { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// The provider name is not one of the supported providers.
    #[error("unknown llm provider: {name}")]
    UnknownProvider { name: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the LLM crate.
pub type Result<T> = std::result::Result<T, LlmError>;
