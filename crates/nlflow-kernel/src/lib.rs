//! nlflow kernel.
//!
//! Deterministic glue shared by every other nlflow crate:
//!
//! - **[`sanitizer`]** -- locale folding and id/slug/display sanitizing.
//! - **[`classifier`]** -- keyword-based module classification backed by an
//!   [`aho_corasick`] automaton.
//! - **[`model`]** -- the `Step` / `Action` structures produced by the
//!   normalizer and carried by `WorkflowCreated` events.
//! - **[`error`]** -- kernel error types via [`thiserror`].
//!
//! Sanitizers and classifiers are plain values.  Build one per engine and
//! pass it in; nothing here is global.

pub mod classifier;
pub mod error;
pub mod model;
pub mod sanitizer;

pub use classifier::{
    ClassifierConfig, ClassifierValidation, DEFAULT_MODULE, ModuleClassifier, ModuleDefinition,
    ModuleMatch,
};
pub use error::{KernelError, Result};
pub use model::{Action, Step, WorkflowDefinition};
pub use sanitizer::{EmailCheck, SanitizeMethod, TextSanitizer};
