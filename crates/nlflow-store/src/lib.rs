//! # nlflow-store
//!
//! SQLite persistence for nlflow.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  SqliteBridge (PersistenceBridge)            │
//! ├──────────────┬───────────────┬───────────────┤
//! │ WorkflowStore│ EventLogStore │ ConditionStore│
//! │              │               │ SnapshotStore │
//! ├──────────────┴───────────────┴───────────────┤
//! │  Database (rusqlite WAL, blocking pool)      │
//! │  Migrations (versioned, transactional)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! let db = Database::open_and_migrate("data/nlflow.db").await?;
//! let service = WorkflowService::new(engine, 100)?
//!     .with_persistence(Arc::new(SqliteBridge::new(db.clone())));
//! ```

pub mod bridge;
pub mod condition_store;
pub mod db;
pub mod error;
pub mod event_store;
pub mod migration;
pub mod snapshot_store;
pub mod workflow_store;

pub use bridge::SqliteBridge;
pub use condition_store::{ConditionStore, StoredCondition};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use event_store::EventLogStore;
pub use snapshot_store::SnapshotStore;
pub use workflow_store::{StoredWorkflow, WorkflowStore};
