//! Structural checks for workflow payloads.
//!
//! Works on untyped JSON so that hand-edited or imported workflows can be
//! checked before they are deserialized.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nlflow_kernel::WorkflowDefinition;

/// A field counts as present when it is set and not `null`, `false`, `0`
/// or an empty string.
fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

/// Validate a `{steps: [{id, name, actions: [{id, name}]}]}` workflow.
///
/// Returns every problem found; an empty list means the workflow is valid.
pub fn validate_workflow(workflow: &Value) -> Vec<String> {
    if workflow.is_null() {
        return vec!["Workflow cannot be null".to_owned()];
    }
    let Some(steps) = workflow.get("steps").and_then(Value::as_array) else {
        return vec!["Workflow must contain steps array".to_owned()];
    };

    let mut errors = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        if !present(step.get("id")) {
            errors.push(format!("Step {i}: missing ID"));
        }
        if !present(step.get("name")) {
            errors.push(format!("Step {i}: missing name"));
        }
        match step.get("actions").and_then(Value::as_array) {
            None => errors.push(format!("Step {i}: missing actions array")),
            Some(actions) => {
                for (j, action) in actions.iter().enumerate() {
                    if !present(action.get("id")) {
                        errors.push(format!("Step {i}, Action {j}: missing ID"));
                    }
                    if !present(action.get("name")) {
                        errors.push(format!("Step {i}, Action {j}: missing name"));
                    }
                }
            }
        }
    }
    errors
}

/// Typed convenience over [`validate_workflow`].
pub fn validate_definition(definition: &WorkflowDefinition) -> Vec<String> {
    match serde_json::to_value(definition) {
        Ok(value) => validate_workflow(&value),
        Err(e) => vec![format!("Workflow could not be serialized: {e}")],
    }
}

/// One id shared by more than one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateWorkflow {
    pub id: String,
    pub count: usize,
    pub names: Vec<String>,
    pub modules: Vec<String>,
}

/// Result of [`find_duplicate_workflows`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub duplicates: Vec<DuplicateWorkflow>,
    /// Number of payloads inspected.
    pub total: usize,
    /// Number of distinct ids.
    pub unique: usize,
}

/// Group workflow payloads by `id` (or `workflowId`) and report ids seen more
/// than once.  Payloads without an id are skipped.
pub fn find_duplicate_workflows(workflows: &[Value]) -> DuplicateReport {
    let mut groups: Vec<DuplicateWorkflow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for w in workflows {
        let Some(id) = ["id", "workflowId"]
            .iter()
            .filter_map(|k| w.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
        else {
            continue;
        };
        let i = *index.entry(id.to_owned()).or_insert_with(|| {
            groups.push(DuplicateWorkflow {
                id: id.to_owned(),
                count: 0,
                names: Vec::new(),
                modules: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[i];
        group.count += 1;
        push_unique(&mut group.names, w.get("name"));
        push_unique(&mut group.modules, w.get("module"));
    }

    let unique = groups.len();
    DuplicateReport {
        duplicates: groups.into_iter().filter(|g| g.count > 1).collect(),
        total: workflows.len(),
        unique,
    }
}

fn push_unique(into: &mut Vec<String>, value: Option<&Value>) {
    if let Some(s) = value.and_then(Value::as_str).filter(|s| !s.is_empty())
        && !into.iter().any(|v| v == s)
    {
        into.push(s.to_owned());
    }
}
