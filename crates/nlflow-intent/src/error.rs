//! Normalizer error types.
//!
//! All intent subsystems surface errors through [`IntentError`].  Provider
//! failures on the LLM path are not raised; they are folded into
//! [`crate::llm::LlmOutcome::Failed`].

/// Unified error type for the normalizer.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Input errors --------------------------------------------------------
    /// The input text is empty or whitespace only.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A sentence does not have the strict `Gdy <condition>, <actions>` shape.
    #[error("invalid sentence format: expected \"Gdy [condition], [actions]\", got `{sentence}`")]
    SentenceFormat { sentence: String },

    // -- Setup errors --------------------------------------------------------
    /// A built-in pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    // -- Provider errors -----------------------------------------------------
    /// The LLM reply could not be turned into a condition and actions.
    #[error("provider error: {reason}")]
    Provider { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the LLM client.
    #[error("llm error: {0}")]
    Llm(#[from] nlflow_llm::LlmError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
