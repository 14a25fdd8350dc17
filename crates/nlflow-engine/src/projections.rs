//! Derived views over the read model and the event log.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nlflow_kernel::DEFAULT_MODULE;

use crate::event::{ACTION_EXECUTED, ACTION_FAILED, Event, WORKFLOW_CREATED};
use crate::read_model::ReadModelEntry;

/// Workflow id used for actions executed outside any workflow.
pub const UNKNOWN_WORKFLOW: &str = "unknown";

/// Per-workflow action counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: String,
    pub name: String,
    pub module: String,
    /// Number of action entries attributed to this workflow.
    pub actions: usize,
}

/// One row of the event timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub label: String,
}

/// Dashboard summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub actions_executed: usize,
    pub actions_failed: usize,
    pub workflows: usize,
    pub by_module: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

/// Count action entries per module (`context.module`, else `Default`).
pub fn module_action_counts(read_model: &[ReadModelEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for module in read_model.iter().filter_map(ReadModelEntry::action_module) {
        *counts.entry(module.to_owned()).or_insert(0) += 1;
    }
    counts
}

/// One status per workflow, in first-seen order.
///
/// Actions are attributed through `context.workflowId`; actions without one
/// land on a synthetic `unknown` workflow.
pub fn workflow_statuses(read_model: &[ReadModelEntry]) -> Vec<WorkflowStatus> {
    let mut statuses: Vec<WorkflowStatus> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in read_model {
        match entry {
            ReadModelEntry::Workflow {
                id, name, module, ..
            } => {
                if !index.contains_key(id) {
                    index.insert(id.clone(), statuses.len());
                    statuses.push(WorkflowStatus {
                        id: id.clone(),
                        name: name.clone(),
                        module: module.clone(),
                        actions: 0,
                    });
                }
            }
            ReadModelEntry::Action { .. } => {
                let wf = entry.action_workflow_id().unwrap_or(UNKNOWN_WORKFLOW);
                let i = *index.entry(wf.to_owned()).or_insert_with(|| {
                    statuses.push(WorkflowStatus {
                        id: wf.to_owned(),
                        name: wf.to_owned(),
                        module: DEFAULT_MODULE.to_owned(),
                        actions: 0,
                    });
                    statuses.len() - 1
                });
                statuses[i].actions += 1;
            }
        }
    }
    statuses
}

/// Events sorted by timestamp (stable for equal timestamps).
pub fn timeline(events: &[Event]) -> Vec<TimelineEntry> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.timestamp());
    sorted
        .into_iter()
        .map(|e| TimelineEntry {
            id: e.id.clone(),
            event_type: e.event_type.clone(),
            time: e.timestamp(),
            label: e
                .payload
                .get("actionName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        })
        .collect()
}

pub fn overview(events: &[Event], read_model: &[ReadModelEntry]) -> Overview {
    let count = |ty: &str| events.iter().filter(|e| e.event_type == ty).count();
    Overview {
        actions_executed: count(ACTION_EXECUTED),
        actions_failed: count(ACTION_FAILED),
        workflows: count(WORKFLOW_CREATED),
        by_module: module_action_counts(read_model),
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use crate::read_model::ActionStatus;
    use serde_json::json;

    fn action(name: &str, context: Value) -> ReadModelEntry {
        ReadModelEntry::Action {
            action_name: name.into(),
            status: ActionStatus::Executed,
            context,
            executed_at: None,
            error: None,
            failed_at: None,
        }
    }

    fn workflow(id: &str, module: &str) -> ReadModelEntry {
        ReadModelEntry::Workflow {
            id: id.into(),
            name: id.replace('_', " "),
            module: module.into(),
            actions: Vec::new(),
            status: "created".into(),
            created_at: Utc::now(),
            source: None,
        }
    }

    #[test]
    fn counts_actions_by_context_module() {
        let rm = vec![
            workflow("a", "Finanse"),
            action("x", json!({"module": "Finanse"})),
            action("y", json!({"module": "Finanse"})),
            action("z", json!({})),
        ];
        let counts = module_action_counts(&rm);
        assert_eq!(counts.get("Finanse"), Some(&2));
        assert_eq!(counts.get(DEFAULT_MODULE), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn statuses_attribute_actions() {
        let rm = vec![
            workflow("klient_zaplaci", "Platnosci"),
            action("x", json!({"workflowId": "klient_zaplaci"})),
            action("y", json!({"workflowId": "klient_zaplaci"})),
            action("z", json!({})),
        ];
        let statuses = workflow_statuses(&rm);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].id, "klient_zaplaci");
        assert_eq!(statuses[0].actions, 2);
        assert_eq!(statuses[1].id, UNKNOWN_WORKFLOW);
        assert_eq!(statuses[1].module, DEFAULT_MODULE);
        assert_eq!(statuses[1].actions, 1);
    }

    #[test]
    fn timeline_sorts_and_labels() {
        let mut late = Event::stamp(NewEvent::new(ACTION_EXECUTED, json!({"actionName": "b"})));
        let early = Event::stamp(NewEvent::new(WORKFLOW_CREATED, json!({"id": "w"})));
        late.metadata.timestamp = early.timestamp() + chrono::Duration::seconds(5);

        let rows = timeline(&[late.clone(), early.clone()]);
        assert_eq!(rows[0].id, early.id);
        assert_eq!(rows[0].label, "");
        assert_eq!(rows[1].label, "b");
    }

    #[test]
    fn overview_counts_events() {
        let events = vec![
            Event::stamp(NewEvent::new(WORKFLOW_CREATED, json!({}))),
            Event::stamp(NewEvent::new(ACTION_EXECUTED, json!({}))),
            Event::stamp(NewEvent::new(ACTION_FAILED, json!({}))),
        ];
        let o = overview(&events, &[action("x", json!({"module": "CRM"}))]);
        assert_eq!(o.workflows, 1);
        assert_eq!(o.actions_executed, 1);
        assert_eq!(o.actions_failed, 1);
        assert_eq!(o.by_module.get("CRM"), Some(&1));
    }
}
