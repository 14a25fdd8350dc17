//! nlflow engine.
//!
//! Event-sourced command processing for workflows built from trigger
//! sentences:
//!
//! - **[`engine`]** -- command dispatch, the append-only event log and the
//!   projected read model.
//! - **[`handlers`]** -- default command handlers and projectors.
//! - **[`history`]** -- bounded undo/redo over engine snapshots.
//! - **[`projections`]** -- module counts, workflow statuses, timeline and
//!   overview.
//! - **[`validator`]**, **[`diagram`]**, **[`serializer`]** -- checking,
//!   rendering and exchanging workflow payloads.
//! - **[`service`]** -- engine + history + persistence bridge.

pub mod diagram;
pub mod engine;
pub mod error;
pub mod event;
pub mod handlers;
pub mod history;
pub mod projections;
pub mod read_model;
pub mod serializer;
pub mod service;
pub mod snapshot;
pub mod validator;

pub use diagram::{render_mermaid, render_mermaid_value};
pub use engine::{ProjectionFold, WorkflowEngine};
pub use error::{EngineError, Result};
pub use event::{Command, CommandResult, Event, EventMetadata, NewEvent};
pub use handlers::{CommandHandler, EventHandler, NlpExtractor, WorkflowPayload};
pub use history::{DEFAULT_HISTORY_SIZE, HistoryManager};
pub use projections::{Overview, TimelineEntry, WorkflowStatus};
pub use read_model::{ActionStatus, ReadModelEntry};
pub use serializer::{ExportFormat, WorkflowDocument};
pub use service::{BatchFailure, BatchReport, CreatedWorkflow, PersistenceBridge, WorkflowService};
pub use snapshot::{EngineSnapshot, SNAPSHOT_SCHEMA_VERSION, Statistics};
pub use validator::{DuplicateReport, DuplicateWorkflow, find_duplicate_workflows, validate_workflow};
