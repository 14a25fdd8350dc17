//! Versioned engine snapshots and on-demand statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{ACTION_EXECUTED, ACTION_FAILED, COMMAND_FAILED, Event, WORKFLOW_CREATED};
use crate::read_model::ReadModelEntry;

/// Current snapshot layout.  Bump when [`EngineSnapshot`] changes shape.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

/// Counts derived from the event log.  Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_events: usize,
    pub actions_executed: usize,
    pub actions_failed: usize,
    pub workflows_created: usize,
    #[serde(default)]
    pub commands_failed: usize,
    /// `"(executed - failed) / executed"` as a percentage with two decimals,
    /// or `"0%"` when nothing has executed.
    pub success_rate: String,
    pub generated_at: DateTime<Utc>,
}

impl Statistics {
    pub fn from_events(events: &[Event]) -> Self {
        let count = |ty: &str| events.iter().filter(|e| e.event_type == ty).count();
        let actions_executed = count(ACTION_EXECUTED);
        let actions_failed = count(ACTION_FAILED);

        Self {
            total_events: events.len(),
            actions_executed,
            actions_failed,
            workflows_created: count(WORKFLOW_CREATED),
            commands_failed: count(COMMAND_FAILED),
            success_rate: success_rate(actions_executed, actions_failed),
            generated_at: Utc::now(),
        }
    }
}

fn success_rate(executed: usize, failed: usize) -> String {
    if executed == 0 {
        return "0%".to_owned();
    }
    let rate = (executed as f64 - failed as f64) / executed as f64 * 100.0;
    format!("{rate:.2}%")
}

/// A whole-engine state value: the event log plus the read model it
/// produced.
///
/// Used for export, import and undo/redo history.  Cloning is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub event_store: Vec<Event>,
    #[serde(default)]
    pub read_model: Vec<ReadModelEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    pub exported_at: DateTime<Utc>,
}

impl EngineSnapshot {
    /// An empty snapshot at the current schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            event_store: Vec::new(),
            read_model: Vec::new(),
            statistics: None,
            exported_at: Utc::now(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.event_store.len()
    }
}
