//! Commands, events and their metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Schema version stamped on every stored event.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

// -- Well-known types --------------------------------------------------------

pub const CREATE_WORKFLOW_FROM_NLP: &str = "CreateWorkflowFromNLP";
pub const CREATE_WORKFLOW_FROM_STEP: &str = "CreateWorkflowFromStep";
pub const EXECUTE_ACTION: &str = "ExecuteAction";

pub const WORKFLOW_CREATED: &str = "WorkflowCreated";
pub const ACTION_EXECUTED: &str = "ActionExecuted";
pub const ACTION_FAILED: &str = "ActionFailed";
pub const COMMAND_FAILED: &str = "CommandFailed";

/// Generate a new unique, time-ordered identifier.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// An intent submitted to the engine.  Never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Command {
    pub fn new(command_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: None,
            command_type: command_type.into(),
            payload,
            metadata: Map::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Returned by a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub command_id: String,
    pub events_generated: usize,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An event as returned by a command handler, before it is stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: Map::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Metadata of a stored event.
///
/// `timestamp` and `version` are stamped by the store; any other caller
/// metadata is kept in `extra` and serialized alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventMetadata {
    /// Stamp fresh metadata, letting caller-supplied `timestamp` and
    /// `version` win when they parse.
    pub fn stamp(caller: Map<String, Value>) -> Self {
        let mut meta = Self {
            timestamp: Utc::now(),
            version: EVENT_SCHEMA_VERSION,
            extra: Map::new(),
        };
        for (key, value) in caller {
            match key.as_str() {
                "timestamp" => {
                    if let Some(ts) = value
                        .as_str()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    {
                        meta.timestamp = ts.with_timezone(&Utc);
                    }
                }
                "version" => {
                    if let Some(v) = value.as_u64().and_then(|v| u32::try_from(v).ok()) {
                        meta.version = v;
                    }
                }
                _ => {
                    meta.extra.insert(key, value);
                }
            }
        }
        meta
    }

    /// Look up a caller metadata entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// An immutable fact in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    pub metadata: EventMetadata,
}

impl Event {
    /// Stamp a handler-produced event with a fresh id and metadata.
    pub fn stamp(event: NewEvent) -> Self {
        Self {
            id: new_id(),
            event_type: event.event_type,
            payload: event.payload,
            metadata: EventMetadata::stamp(event.metadata),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_keeps_caller_metadata() {
        let event = Event::stamp(
            NewEvent::new(ACTION_EXECUTED, json!({"actionName": "x"}))
                .with_meta("source", "User")
                .with_meta("timestamp", "2024-05-01T10:00:00Z")
                .with_meta("version", 3),
        );
        assert_eq!(event.metadata.version, 3);
        assert_eq!(event.timestamp().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(event.metadata.get("source"), Some(&json!("User")));
    }

    #[test]
    fn stamp_ignores_unparsable_timestamp() {
        let before = Utc::now();
        let event = Event::stamp(NewEvent::new("X", Value::Null).with_meta("timestamp", "soon"));
        assert!(event.timestamp() >= before);
        assert_eq!(event.metadata.version, EVENT_SCHEMA_VERSION);
        assert!(event.metadata.get("timestamp").is_none());
    }

    #[test]
    fn event_json_shape() {
        let event = Event::stamp(NewEvent::new(WORKFLOW_CREATED, json!({})).with_meta("source", "NLP"));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], WORKFLOW_CREATED);
        assert_eq!(v["metadata"]["version"], 1);
        assert_eq!(v["metadata"]["source"], "NLP");
        assert!(v["metadata"]["timestamp"].is_string());

        let back: Event = serde_json::from_value(v).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn command_wire_shape() {
        let cmd: Command = serde_json::from_value(json!({
            "type": EXECUTE_ACTION,
            "payload": {"actionName": "x"}
        }))
        .unwrap();
        assert_eq!(cmd.command_type, EXECUTE_ACTION);
        assert!(cmd.metadata.is_empty());
        assert!(cmd.id.is_none());
    }
}
