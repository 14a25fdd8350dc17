//! The derived, queryable view built by projecting events.
//!
//! Every entry is a pure function of one event.  Rebuilding from the log
//! therefore always reproduces the live read model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nlflow_kernel::{Action, DEFAULT_MODULE};

/// Outcome recorded on an action entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Executed,
    Failed,
}

/// One projected read-model row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadModelEntry {
    /// Produced by `WorkflowCreated`.
    #[serde(rename_all = "camelCase")]
    Workflow {
        id: String,
        name: String,
        module: String,
        #[serde(default)]
        actions: Vec<Action>,
        status: String,
        created_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Produced by `ActionExecuted` and `ActionFailed`.
    #[serde(rename_all = "camelCase")]
    Action {
        action_name: String,
        status: ActionStatus,
        #[serde(default)]
        context: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        executed_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_at: Option<DateTime<Utc>>,
    },
}

/// Status string stamped on freshly created workflow entries.
pub const WORKFLOW_STATUS_CREATED: &str = "created";

impl ReadModelEntry {
    pub fn is_workflow(&self) -> bool {
        matches!(self, Self::Workflow { .. })
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }

    /// Module an action entry counts towards: `context.module` when present.
    pub fn action_module(&self) -> Option<&str> {
        match self {
            Self::Action { context, .. } => Some(
                context
                    .get("module")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_MODULE),
            ),
            Self::Workflow { .. } => None,
        }
    }

    /// Workflow an action entry belongs to (`context.workflowId`).
    pub fn action_workflow_id(&self) -> Option<&str> {
        match self {
            Self::Action { context, .. } => context.get("workflowId").and_then(Value::as_str),
            Self::Workflow { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_entry_wire_shape() {
        let entry = ReadModelEntry::Action {
            action_name: "wyślij fakturę".into(),
            status: ActionStatus::Executed,
            context: json!({"module": "Finanse"}),
            executed_at: Some(Utc::now()),
            error: None,
            failed_at: None,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["type"], "action");
        assert_eq!(v["status"], "executed");
        assert_eq!(v["actionName"], "wyślij fakturę");
        assert!(v.get("error").is_none());
        assert_eq!(entry.action_module(), Some("Finanse"));
    }

    #[test]
    fn action_module_defaults() {
        let entry = ReadModelEntry::Action {
            action_name: "x".into(),
            status: ActionStatus::Failed,
            context: Value::Null,
            executed_at: None,
            error: Some("boom".into()),
            failed_at: Some(Utc::now()),
        };
        assert_eq!(entry.action_module(), Some(DEFAULT_MODULE));
        assert_eq!(entry.action_workflow_id(), None);
    }

    #[test]
    fn workflow_entry_round_trips() {
        let v = json!({
            "type": "workflow",
            "id": "klient_zaplaci",
            "name": "klient zapłaci",
            "module": "Platnosci",
            "actions": [],
            "status": "created",
            "createdAt": "2024-05-01T10:00:00Z"
        });
        let entry: ReadModelEntry = serde_json::from_value(v).unwrap();
        assert!(entry.is_workflow());
        assert!(!entry.is_action());
    }
}
