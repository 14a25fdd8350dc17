//! Default command handlers and event projectors.
//!
//! Command handlers turn a payload into zero or more [`NewEvent`]s.
//! Projectors fold one stored [`Event`] into the read model.  Both are plain
//! closures so callers can register their own next to the defaults.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use nlflow_kernel::{ModuleClassifier, Step, TextSanitizer};

use crate::error::{EngineError, Result};
use crate::event::{
    ACTION_EXECUTED, ACTION_FAILED, CREATE_WORKFLOW_FROM_NLP, CREATE_WORKFLOW_FROM_STEP, Event,
    EXECUTE_ACTION, NewEvent, WORKFLOW_CREATED,
};
use crate::read_model::{ActionStatus, ReadModelEntry, WORKFLOW_STATUS_CREATED};

/// Turns a command payload and metadata into events.
pub type CommandHandler =
    Arc<dyn Fn(&Value, &Map<String, Value>) -> Result<Vec<NewEvent>> + Send + Sync>;

/// Folds one stored event into the read model.
pub type EventHandler = Arc<dyn Fn(&Event, &mut Vec<ReadModelEntry>) -> Result<()> + Send + Sync>;

/// Source tag for workflows built by the simplified extractor.
pub const SOURCE_NLP: &str = "NLP";

/// Source tag for workflows built from a normalizer step.
pub const SOURCE_NORMALIZER: &str = "Normalizer";

/// Message returned when a sentence lacks the marker + comma shape.
pub const SENTENCE_FORMAT_HINT: &str =
    "Invalid sentence format. Expected: \"Gdy [condition], [actions]\"";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of `WorkflowCreated`: the step plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPayload {
    #[serde(flatten)]
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Payload of `ActionExecuted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecutedPayload {
    pub action_name: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Payload of `ActionFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailedPayload {
    pub action_name: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub context: Value,
}

// ---------------------------------------------------------------------------
// Simplified extractor
// ---------------------------------------------------------------------------

/// Single-pattern extractor used by `CreateWorkflowFromNLP`.
///
/// Accepts `"<marker> <condition>, <action> [i|oraz|and ...] <action>"` and
/// nothing else.  Independent of the tiered normalizer.
#[derive(Debug, Clone)]
pub struct NlpExtractor {
    sentence: Regex,
    conjunctions: Regex,
}

impl NlpExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sentence: compile(
                r"(?is)\b(?:gdy|kiedy|jeśli|jesli|jeżeli|jezeli|when|if)\s+(.+?),\s*(.+)",
            )?,
            conjunctions: compile(r"(?i)\s+(?:(?:i|oraz|a\s+także|następnie|and|then)\s+)+")?,
        })
    }

    /// Split a sentence into its condition and action names.
    pub fn extract(&self, sentence: &str) -> Result<(String, Vec<String>)> {
        let caps = self
            .sentence
            .captures(sentence)
            .ok_or_else(|| EngineError::Validation {
                reason: SENTENCE_FORMAT_HINT.into(),
            })?;

        let condition = caps[1].trim().to_owned();
        let actions: Vec<String> = self
            .conjunctions
            .split(&caps[2])
            .map(|a| a.trim().trim_end_matches('.').trim().to_owned())
            .filter(|a| !a.is_empty())
            .collect();

        if condition.is_empty() || actions.is_empty() {
            return Err(EngineError::Validation {
                reason: SENTENCE_FORMAT_HINT.into(),
            });
        }
        Ok((condition, actions))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| EngineError::Validation {
        reason: format!("invalid pattern `{pattern}`: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// `CreateWorkflowFromNLP { sentence }` → one `WorkflowCreated`.
///
/// A bare string payload is accepted as the sentence.
pub fn create_workflow_from_nlp(
    sanitizer: Arc<TextSanitizer>,
    classifier: Arc<ModuleClassifier>,
) -> Result<CommandHandler> {
    let extractor = NlpExtractor::new()?;
    Ok(Arc::new(move |payload: &Value, _meta: &Map<String, Value>| {
        let sentence = payload
            .get("sentence")
            .and_then(Value::as_str)
            .or_else(|| payload.as_str())
            .ok_or_else(|| EngineError::Validation {
                reason: format!("{CREATE_WORKFLOW_FROM_NLP} requires a `sentence` string"),
            })?;

        let (condition, actions) = extractor.extract(sentence)?;
        let step = Step::build(&condition, &actions, &sanitizer, &classifier);
        debug!(id = %step.id, module = %step.module, actions = step.actions.len(), "sentence extracted");

        workflow_created(step, SOURCE_NLP)
    }))
}

/// `CreateWorkflowFromStep { step, source? }` → one `WorkflowCreated`.
///
/// Lets a normalizer outcome enter the log without re-parsing the sentence.
pub fn create_workflow_from_step() -> CommandHandler {
    Arc::new(|payload: &Value, _meta: &Map<String, Value>| {
        let raw = payload.get("step").ok_or_else(|| EngineError::Validation {
            reason: format!("{CREATE_WORKFLOW_FROM_STEP} requires a `step` object"),
        })?;
        let step: Step = serde_json::from_value(raw.clone()).map_err(|e| EngineError::Validation {
            reason: format!("malformed step: {e}"),
        })?;
        if step.id.trim().is_empty() || step.name.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "step requires a non-empty id and name".into(),
            });
        }
        let source = payload
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(SOURCE_NORMALIZER);

        workflow_created(step, source)
    })
}

fn workflow_created(step: Step, source: &str) -> Result<Vec<NewEvent>> {
    let payload = serde_json::to_value(WorkflowPayload {
        step,
        source: Some(source.to_owned()),
    })?;
    Ok(vec![NewEvent::new(WORKFLOW_CREATED, payload)])
}

/// `ExecuteAction { actionName, context }` → one `ActionExecuted`.
///
/// The action is not checked against any known workflow.
pub fn execute_action() -> CommandHandler {
    Arc::new(|payload: &Value, _meta: &Map<String, Value>| {
        let action_name = payload
            .get("actionName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EngineError::Validation {
                reason: format!("{EXECUTE_ACTION} requires a non-empty `actionName`"),
            })?;
        let context = match payload.get("context") {
            Some(Value::Null) | None => json!({}),
            Some(ctx) => ctx.clone(),
        };

        let payload = serde_json::to_value(ActionExecutedPayload {
            action_name: action_name.to_owned(),
            context,
            executed_at: Some(Utc::now()),
        })?;
        Ok(vec![NewEvent::new(ACTION_EXECUTED, payload)])
    })
}

// ---------------------------------------------------------------------------
// Projectors
// ---------------------------------------------------------------------------

fn payload_as<T: serde::de::DeserializeOwned>(event: &Event) -> Result<T> {
    serde_json::from_value(event.payload.clone()).map_err(|e| EngineError::Projection {
        event_type: event.event_type.clone(),
        reason: e.to_string(),
    })
}

/// `WorkflowCreated` → `{type: "workflow", status: "created", ...}`.
pub fn project_workflow_created() -> EventHandler {
    Arc::new(|event: &Event, read_model: &mut Vec<ReadModelEntry>| {
        let WorkflowPayload { step, source } = payload_as(event)?;
        read_model.push(ReadModelEntry::Workflow {
            id: step.id,
            name: step.name,
            module: step.module,
            actions: step.actions,
            status: WORKFLOW_STATUS_CREATED.to_owned(),
            created_at: event.timestamp(),
            source,
        });
        Ok(())
    })
}

/// `ActionExecuted` → `{type: "action", status: "executed", ...}`.
pub fn project_action_executed() -> EventHandler {
    Arc::new(|event: &Event, read_model: &mut Vec<ReadModelEntry>| {
        let p: ActionExecutedPayload = payload_as(event)?;
        read_model.push(ReadModelEntry::Action {
            action_name: p.action_name,
            status: ActionStatus::Executed,
            context: p.context,
            executed_at: Some(p.executed_at.unwrap_or_else(|| event.timestamp())),
            error: None,
            failed_at: None,
        });
        Ok(())
    })
}

/// `ActionFailed` → `{type: "action", status: "failed", error, ...}`.
pub fn project_action_failed() -> EventHandler {
    Arc::new(|event: &Event, read_model: &mut Vec<ReadModelEntry>| {
        let p: ActionFailedPayload = payload_as(event)?;
        read_model.push(ReadModelEntry::Action {
            action_name: p.action_name,
            status: ActionStatus::Failed,
            context: p.context,
            executed_at: None,
            error: Some(p.error),
            failed_at: Some(event.timestamp()),
        });
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
