//! Engine error types.
//!
//! Command failures are surfaced through [`EngineError`] *and* recorded as
//! `CommandFailed` events.  Projector failures are logged, never returned.

/// Unified error type for the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Command errors ------------------------------------------------------
    /// The command payload or sentence has the wrong shape.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// No handler is registered for the command type.
    #[error("no handler registered for command type: {command_type}")]
    UnknownCommand { command_type: String },

    /// A command handler failed for a reason other than validation.
    #[error("handler for `{command_type}` failed: {reason}")]
    Handler {
        command_type: String,
        reason: String,
    },

    // -- Projection errors ---------------------------------------------------
    /// A projector could not apply an event.
    #[error("projection error for `{event_type}`: {reason}")]
    Projection { event_type: String, reason: String },

    /// No named projection is registered under this name.
    #[error("projection not found: {name}")]
    ProjectionNotFound { name: String },

    // -- State errors --------------------------------------------------------
    /// A snapshot could not be imported.
    #[error("state import failed: {reason}")]
    StateImport { reason: String },

    /// A serialized workflow could not be read.
    #[error("workflow import failed: {reason}")]
    WorkflowImport { reason: String },

    // -- Persistence ---------------------------------------------------------
    /// The persistence bridge rejected a write.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the normalizer crate.
    #[error("intent error: {0}")]
    Intent(#[from] nlflow_intent::IntentError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization or deserialization failed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
