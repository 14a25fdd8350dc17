//! Kernel error types.
//!
//! The kernel is mostly infallible glue: sanitizing never fails and the
//! classifier always has a `Default` answer.  Errors only surface when a
//! caller hands the classifier a configuration it cannot use.

/// Unified error type for the nlflow kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Classifier errors --------------------------------------------------
    /// A module definition was rejected (empty name or keyword list).
    #[error("invalid module definition `{module}`: {reason}")]
    InvalidModule { module: String, reason: String },

    /// Building the keyword automaton failed.
    #[error("classifier build error: {reason}")]
    ClassifierBuild { reason: String },

    // -- Serialization ------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
