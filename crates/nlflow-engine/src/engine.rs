//! Event-sourced workflow command engine.
//!
//! Commands are dispatched to a single registered handler.  The events a
//! handler returns are stamped, appended to the log in return order and fanned
//! out to every projector registered for their type.  The read model is only
//! ever written by projectors, so replaying the log from scratch reproduces
//! it exactly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use nlflow_kernel::{ModuleClassifier, Step, TextSanitizer, WorkflowDefinition};

use crate::error::{EngineError, Result};
use crate::event::{
    ACTION_EXECUTED, ACTION_FAILED, COMMAND_FAILED, CREATE_WORKFLOW_FROM_NLP,
    CREATE_WORKFLOW_FROM_STEP, Command, CommandResult, EXECUTE_ACTION, Event, NewEvent,
    WORKFLOW_CREATED, new_id,
};
use crate::handlers::{self, CommandHandler, EventHandler, WorkflowPayload};
use crate::read_model::ReadModelEntry;
use crate::snapshot::{EngineSnapshot, SNAPSHOT_SCHEMA_VERSION, Statistics};

/// Folds events into an arbitrary JSON value, starting from `{}`.
pub type ProjectionFold = Arc<dyn Fn(Value, &Event) -> Value + Send + Sync>;

/// Metadata `source` stamped on engine-generated failure events.
pub const ENGINE_SOURCE: &str = "WorkflowEngine";

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The command engine: handlers, projectors, the event log and the read
/// model.
pub struct WorkflowEngine {
    sanitizer: Arc<TextSanitizer>,
    classifier: Arc<ModuleClassifier>,
    command_handlers: HashMap<String, CommandHandler>,
    event_handlers: HashMap<String, Vec<EventHandler>>,
    projections: HashMap<String, ProjectionFold>,
    events: Vec<Event>,
    read_model: Vec<ReadModelEntry>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("command_handlers", &self.command_handlers.len())
            .field("event_handlers", &self.event_handlers.len())
            .field("projections", &self.projections.len())
            .field("events", &self.events.len())
            .field("read_model", &self.read_model.len())
            .finish()
    }
}

impl WorkflowEngine {
    /// Create an engine with the default command handlers and projectors.
    pub fn new(sanitizer: Arc<TextSanitizer>, classifier: Arc<ModuleClassifier>) -> Result<Self> {
        let mut engine = Self::without_defaults(sanitizer, classifier);

        let nlp = handlers::create_workflow_from_nlp(
            Arc::clone(&engine.sanitizer),
            Arc::clone(&engine.classifier),
        )?;
        engine.register_command_handler(CREATE_WORKFLOW_FROM_NLP, nlp);
        engine.register_command_handler(CREATE_WORKFLOW_FROM_STEP, handlers::create_workflow_from_step());
        engine.register_command_handler(EXECUTE_ACTION, handlers::execute_action());

        engine.register_event_handler(WORKFLOW_CREATED, handlers::project_workflow_created());
        engine.register_event_handler(ACTION_EXECUTED, handlers::project_action_executed());
        engine.register_event_handler(ACTION_FAILED, handlers::project_action_failed());

        info!(
            command_handlers = engine.command_handlers.len(),
            "workflow engine initialised"
        );
        Ok(engine)
    }

    /// Create an engine with no handlers at all.
    pub fn without_defaults(sanitizer: Arc<TextSanitizer>, classifier: Arc<ModuleClassifier>) -> Self {
        Self {
            sanitizer,
            classifier,
            command_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
            projections: HashMap::new(),
            events: Vec::new(),
            read_model: Vec::new(),
        }
    }

    pub fn sanitizer(&self) -> &TextSanitizer {
        &self.sanitizer
    }

    pub fn classifier(&self) -> &ModuleClassifier {
        &self.classifier
    }

    // -- Registration --------------------------------------------------------

    /// Register the handler for a command type, replacing any previous one.
    pub fn register_command_handler(&mut self, command_type: impl Into<String>, handler: CommandHandler) {
        let command_type = command_type.into();
        debug!(command_type = %command_type, "command handler registered");
        self.command_handlers.insert(command_type, handler);
    }

    /// Append a projector for an event type.  Projectors run in registration
    /// order.
    pub fn register_event_handler(&mut self, event_type: impl Into<String>, handler: EventHandler) {
        let event_type = event_type.into();
        debug!(event_type = %event_type, "event handler registered");
        self.event_handlers.entry(event_type).or_default().push(handler);
    }

    /// Register a named fold over the whole log.
    pub fn register_projection(&mut self, name: impl Into<String>, fold: ProjectionFold) {
        self.projections.insert(name.into(), fold);
    }

    // -- Commands ------------------------------------------------------------

    /// Run a command through its handler and store the resulting events.
    ///
    /// On handler failure a `CommandFailed` event is stored and the original
    /// error is returned.  An unknown command type records nothing.
    pub fn execute_command(&mut self, command: Command) -> Result<CommandResult> {
        let Some(handler) = self.command_handlers.get(&command.command_type).cloned() else {
            warn!(command_type = %command.command_type, "unknown command type");
            return Err(EngineError::UnknownCommand {
                command_type: command.command_type,
            });
        };
        let command_id = command.id.clone().unwrap_or_else(new_id);
        debug!(command_type = %command.command_type, command_id = %command_id, "executing command");

        match handler(&command.payload, &command.metadata) {
            Ok(events) => {
                let events_generated = events.len();
                for mut event in events {
                    for (key, value) in &command.metadata {
                        event
                            .metadata
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                    event
                        .metadata
                        .entry("commandId")
                        .or_insert_with(|| Value::String(command_id.clone()));
                    self.store_event(event);
                }
                info!(
                    command_type = %command.command_type,
                    command_id = %command_id,
                    events_generated,
                    "command executed"
                );
                Ok(CommandResult {
                    success: true,
                    command_id,
                    events_generated,
                })
            }
            Err(err) => {
                warn!(
                    command_type = %command.command_type,
                    command_id = %command_id,
                    error = %err,
                    "command failed"
                );
                let original = serde_json::to_value(&command).unwrap_or(Value::Null);
                self.store_event(
                    NewEvent::new(
                        COMMAND_FAILED,
                        json!({
                            "commandType": command.command_type,
                            "error": err.to_string(),
                            "originalCommand": original,
                        }),
                    )
                    .with_meta("source", ENGINE_SOURCE)
                    .with_meta("commandId", command_id),
                );
                Err(err)
            }
        }
    }

    /// Stamp, append and project one event.  Returns the stored event.
    ///
    /// Projector failures are logged and never remove the event.
    pub fn store_event(&mut self, event: NewEvent) -> Event {
        let stored = Event::stamp(event);
        self.events.push(stored.clone());
        dispatch(&self.event_handlers, &stored, &mut self.read_model);
        debug!(event_id = %stored.id, event_type = %stored.event_type, "event stored");
        stored
    }

    /// Submit `CreateWorkflowFromNLP` for a sentence.
    pub fn create_workflow_from_nlp(&mut self, sentence: &str) -> Result<CommandResult> {
        self.execute_command(
            Command::new(CREATE_WORKFLOW_FROM_NLP, json!({ "sentence": sentence }))
                .with_meta("source", handlers::SOURCE_NLP),
        )
    }

    /// Submit `CreateWorkflowFromStep` for an already-normalized step.
    pub fn create_workflow_from_step(&mut self, step: &Step, source: &str) -> Result<CommandResult> {
        self.execute_command(
            Command::new(CREATE_WORKFLOW_FROM_STEP, json!({ "step": step, "source": source }))
                .with_meta("source", source),
        )
    }

    /// Submit `ExecuteAction`.
    pub fn execute_action(&mut self, action_name: &str, context: Value) -> Result<CommandResult> {
        self.execute_command(
            Command::new(
                EXECUTE_ACTION,
                json!({ "actionName": action_name, "context": context }),
            )
            .with_meta("source", "User"),
        )
    }

    // -- Queries -------------------------------------------------------------

    /// The full event log.
    pub fn events(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// The most recently stored event.
    pub fn last_event(&self) -> Option<Event> {
        self.events.last().cloned()
    }

    pub fn events_by_type(&self, event_type: &str) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Events with `start <= timestamp <= end`.
    pub fn events_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.timestamp() >= start && e.timestamp() <= end)
            .cloned()
            .collect()
    }

    pub fn read_model(&self) -> Vec<ReadModelEntry> {
        self.read_model.clone()
    }

    /// Counts and success rate, computed from the log on every call.
    pub fn statistics(&self) -> Statistics {
        Statistics::from_events(&self.events)
    }

    /// Every `WorkflowCreated` payload in log order, duplicates included.
    pub fn workflow_payloads(&self) -> Vec<Value> {
        self.events
            .iter()
            .filter(|e| e.event_type == WORKFLOW_CREATED)
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Current workflows keyed by id.  A later `WorkflowCreated` with the
    /// same id replaces the earlier one in place.
    pub fn workflows(&self) -> Vec<Step> {
        let mut order: Vec<Step> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for event in self.events.iter().filter(|e| e.event_type == WORKFLOW_CREATED) {
            let Ok(WorkflowPayload { step, .. }) =
                serde_json::from_value::<WorkflowPayload>(event.payload.clone())
            else {
                continue;
            };
            match index.get(&step.id) {
                Some(&i) => order[i] = step,
                None => {
                    index.insert(step.id.clone(), order.len());
                    order.push(step);
                }
            }
        }
        order
    }

    /// All current workflows as one definition (one step per workflow).
    pub fn workflow_definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            steps: self.workflows(),
        }
    }

    // -- Replay --------------------------------------------------------------

    /// Project the full log into a fresh read model without touching the
    /// live one.
    pub fn replay(&self) -> Vec<ReadModelEntry> {
        let mut read_model = Vec::new();
        for event in &self.events {
            dispatch(&self.event_handlers, event, &mut read_model);
        }
        read_model
    }

    /// Replace the live read model with a replay of the log.
    pub fn rebuild_read_model(&mut self) {
        self.read_model = self.replay();
        info!(entries = self.read_model.len(), "read model rebuilt");
    }

    /// Fold the whole log through a named projection, starting from `{}`.
    pub fn rebuild_projection(&self, name: &str) -> Result<Value> {
        let fold = self
            .projections
            .get(name)
            .ok_or_else(|| EngineError::ProjectionNotFound {
                name: name.to_owned(),
            })?;
        Ok(self
            .events
            .iter()
            .fold(Value::Object(Map::new()), |acc, event| fold(acc, event)))
    }

    // -- State ---------------------------------------------------------------

    /// Clone the log, the read model and current statistics into a snapshot.
    pub fn export_state(&self) -> EngineSnapshot {
        EngineSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            event_store: self.events.clone(),
            read_model: self.read_model.clone(),
            statistics: Some(self.statistics()),
            exported_at: Utc::now(),
        }
    }

    /// Replace the log and read model with a snapshot.
    ///
    /// Nothing is changed when the snapshot is rejected.
    pub fn try_import_state(&mut self, snapshot: EngineSnapshot) -> Result<()> {
        if snapshot.schema_version == 0 || snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(EngineError::StateImport {
                reason: format!(
                    "unsupported snapshot schema version {} (supported: 1..={SNAPSHOT_SCHEMA_VERSION})",
                    snapshot.schema_version
                ),
            });
        }
        let mut seen = std::collections::HashSet::with_capacity(snapshot.event_store.len());
        if let Some(dup) = snapshot.event_store.iter().find(|e| !seen.insert(e.id.as_str())) {
            return Err(EngineError::StateImport {
                reason: format!("duplicate event id {}", dup.id),
            });
        }

        self.events = snapshot.event_store;
        self.read_model = snapshot.read_model;
        info!(
            events = self.events.len(),
            read_model = self.read_model.len(),
            "engine state imported"
        );
        Ok(())
    }

    /// Boolean form of [`Self::try_import_state`].
    pub fn import_state(&mut self, snapshot: EngineSnapshot) -> bool {
        match self.try_import_state(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "state import rejected");
                false
            }
        }
    }

    /// Import an untyped snapshot (for example a JSON file).
    pub fn import_state_value(&mut self, value: &Value) -> bool {
        match serde_json::from_value::<EngineSnapshot>(value.clone()) {
            Ok(snapshot) => self.import_state(snapshot),
            Err(e) => {
                warn!(error = %e, "state import rejected: malformed snapshot");
                false
            }
        }
    }

    /// Drop the log and read model.  Registered handlers stay.
    pub fn clear(&mut self) {
        self.events.clear();
        self.read_model.clear();
        info!("engine state cleared");
    }
}

/// Run every projector registered for the event's type, logging failures.
fn dispatch(
    handlers: &HashMap<String, Vec<EventHandler>>,
    event: &Event,
    read_model: &mut Vec<ReadModelEntry>,
) {
    let Some(list) = handlers.get(&event.event_type) else {
        return;
    };
    for (position, handler) in list.iter().enumerate() {
        if let Err(e) = handler(event, read_model) {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                handler = position,
                error = %e,
                "event handler failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::ActionStatus;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(
            Arc::new(TextSanitizer::new()),
            Arc::new(ModuleClassifier::new()),
        )
        .unwrap()
    }

    #[test]
    fn create_appends_one_event_and_one_entry() {
        let mut e = engine();
        let result = e
            .create_workflow_from_nlp("Gdy wpłata klienta nastąpi, wystaw fakturę i uruchom kampanię")
            .unwrap();
        assert!(result.success);
        assert_eq!(result.events_generated, 1);
        assert_eq!(e.event_count(), 1);

        let rm = e.read_model();
        assert_eq!(rm.len(), 1);
        match &rm[0] {
            ReadModelEntry::Workflow {
                id, module, actions, status, ..
            } => {
                assert_eq!(id, "wplata_klienta_nastapi");
                assert_eq!(module, "Platnosci");
                assert_eq!(actions.len(), 2);
                assert_eq!(status, "created");
            }
            other => panic!("unexpected entry {other:?}"),
        }

        let event = e.last_event().unwrap();
        assert_eq!(event.metadata.get("source"), Some(&json!("NLP")));
        assert_eq!(
            event.metadata.get("commandId"),
            Some(&Value::String(result.command_id))
        );
    }

    #[test]
    fn invalid_sentence_records_only_command_failed() {
        let mut e = engine();
        let err = e
            .create_workflow_from_nlp("Nieprawidłowe zdanie bez struktury")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        assert_eq!(e.event_count(), 1);
        assert!(e.events_by_type(WORKFLOW_CREATED).is_empty());
        let failed = e.events_by_type(COMMAND_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].payload["commandType"], CREATE_WORKFLOW_FROM_NLP);
        assert_eq!(
            failed[0].payload["originalCommand"]["payload"]["sentence"],
            "Nieprawidłowe zdanie bez struktury"
        );
        assert_eq!(failed[0].metadata.get("source"), Some(&json!(ENGINE_SOURCE)));
        assert!(e.read_model().is_empty());
    }

    #[test]
    fn unknown_command_records_nothing() {
        let mut e = engine();
        let err = e
            .execute_command(Command::new("DeleteEverything", Value::Null))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCommand { .. }));
        assert_eq!(e.event_count(), 0);
    }

    #[test]
    fn handler_returning_many_events_keeps_order() {
        let mut e = engine();
        e.register_command_handler(
            "Bulk",
            Arc::new(|_p: &Value, _m: &Map<String, Value>| {
                Ok(vec![
                    NewEvent::new(ACTION_EXECUTED, json!({"actionName": "a"})),
                    NewEvent::new(ACTION_FAILED, json!({"actionName": "b", "error": "x"})),
                    NewEvent::new(ACTION_EXECUTED, json!({"actionName": "c"})),
                ])
            }),
        );
        let result = e.execute_command(Command::new("Bulk", Value::Null)).unwrap();
        assert_eq!(result.events_generated, 3);

        let names: Vec<_> = e
            .read_model()
            .into_iter()
            .map(|entry| match entry {
                ReadModelEntry::Action {
                    action_name, status, ..
                } => (action_name, status),
                other => panic!("unexpected entry {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), ActionStatus::Executed),
                ("b".to_string(), ActionStatus::Failed),
                ("c".to_string(), ActionStatus::Executed),
            ]
        );
    }

    #[test]
    fn handler_returning_nothing_is_success() {
        let mut e = engine();
        e.register_command_handler("Noop", Arc::new(|_p: &Value, _m: &Map<String, Value>| Ok(Vec::new())));
        let result = e.execute_command(Command::new("Noop", Value::Null)).unwrap();
        assert_eq!(result.events_generated, 0);
        assert_eq!(e.event_count(), 0);
    }

    #[test]
    fn explicit_command_id_is_kept() {
        let mut e = engine();
        let mut cmd = Command::new(EXECUTE_ACTION, json!({"actionName": "x"}));
        cmd.id = Some("cmd-1".into());
        assert_eq!(e.execute_command(cmd).unwrap().command_id, "cmd-1");
    }

    #[test]
    fn failing_projector_keeps_event_and_later_projectors_run() {
        let mut e = engine();
        e.register_event_handler(
            ACTION_EXECUTED,
            Arc::new(|event: &Event, _rm: &mut Vec<ReadModelEntry>| {
                Err(EngineError::Projection {
                    event_type: event.event_type.clone(),
                    reason: "boom".into(),
                })
            }),
        );
        e.register_event_handler(
            ACTION_EXECUTED,
            Arc::new(|_event: &Event, rm: &mut Vec<ReadModelEntry>| {
                rm.push(ReadModelEntry::Action {
                    action_name: "audit".into(),
                    status: ActionStatus::Executed,
                    context: Value::Null,
                    executed_at: None,
                    error: None,
                    failed_at: None,
                });
                Ok(())
            }),
        );

        e.execute_action("wyślij email", json!({})).unwrap();
        assert_eq!(e.event_count(), 1);
        // Default projector plus the audit projector.
        assert_eq!(e.read_model().len(), 2);
    }

    #[test]
    fn replay_matches_live_read_model() {
        let mut e = engine();
        e.create_workflow_from_nlp("Gdy klient zapłaci, wyślij fakturę").unwrap();
        e.execute_action("wyślij fakturę", json!({"workflowId": "klient_zaplaci"}))
            .unwrap();
        let _ = e.create_workflow_from_nlp("bez struktury");
        e.store_event(NewEvent::new(
            ACTION_FAILED,
            json!({"actionName": "wyślij fakturę", "error": "timeout"}),
        ));

        assert_eq!(e.replay(), e.read_model());
        let before = e.read_model();
        e.rebuild_read_model();
        assert_eq!(e.read_model(), before);
    }

    #[test]
    fn time_range_is_inclusive() {
        let mut e = engine();
        let first = e.store_event(NewEvent::new("Tick", json!({})));
        let second = e.store_event(NewEvent::new("Tick", json!({})));

        let hits = e.events_by_time_range(first.timestamp(), second.timestamp());
        assert_eq!(hits.len(), 2);
        let none = e.events_by_time_range(
            second.timestamp() + chrono::Duration::seconds(1),
            second.timestamp() + chrono::Duration::seconds(2),
        );
        assert!(none.is_empty());
    }

    #[test]
    fn returned_collections_are_copies() {
        let mut e = engine();
        e.execute_action("x", json!({})).unwrap();
        let mut events = e.events();
        events.clear();
        let mut rm = e.read_model();
        rm.clear();
        assert_eq!(e.event_count(), 1);
        assert_eq!(e.read_model().len(), 1);
    }

    #[test]
    fn statistics_follow_the_log() {
        let mut e = engine();
        e.execute_action("a", json!({})).unwrap();
        e.execute_action("b", json!({})).unwrap();
        e.store_event(NewEvent::new(ACTION_FAILED, json!({"actionName": "b", "error": "x"})));
        let stats = e.statistics();
        assert_eq!(stats.actions_executed, 2);
        assert_eq!(stats.actions_failed, 1);
        assert_eq!(stats.success_rate, "50.00%");
    }

    #[test]
    fn import_replaces_state() {
        let mut source = engine();
        source.create_workflow_from_nlp("Gdy x, y").unwrap();
        let snapshot = source.export_state();

        let mut target = engine();
        target.execute_action("a", json!({})).unwrap();
        target.execute_action("b", json!({})).unwrap();
        assert!(target.import_state(snapshot.clone()));
        assert_eq!(target.events(), snapshot.event_store);
        assert_eq!(target.read_model(), snapshot.read_model);
    }

    #[test]
    fn rejected_import_leaves_state_untouched() {
        let mut e = engine();
        e.execute_action("a", json!({})).unwrap();
        let before = e.events();

        let mut newer = e.export_state();
        newer.schema_version = SNAPSHOT_SCHEMA_VERSION + 1;
        newer.event_store.clear();
        assert!(!e.import_state(newer));

        let mut duplicated = e.export_state();
        let copy = duplicated.event_store[0].clone();
        duplicated.event_store.push(copy);
        assert!(!e.import_state(duplicated));

        assert!(!e.import_state_value(&json!({"eventStore": "nope"})));
        assert_eq!(e.events(), before);
    }

    #[test]
    fn named_projection_folds_from_empty_object() {
        let mut e = engine();
        e.register_projection(
            "counts",
            Arc::new(|mut acc: Value, event: &Event| {
                let n = acc[&event.event_type].as_u64().unwrap_or(0);
                acc[&event.event_type] = json!(n + 1);
                acc
            }),
        );
        e.execute_action("a", json!({})).unwrap();
        e.execute_action("b", json!({})).unwrap();
        assert_eq!(e.rebuild_projection("counts").unwrap(), json!({"ActionExecuted": 2}));
        assert!(matches!(
            e.rebuild_projection("missing"),
            Err(EngineError::ProjectionNotFound { .. })
        ));
    }

    #[test]
    fn workflows_last_write_wins() {
        let mut e = engine();
        e.create_workflow_from_nlp("Gdy klient zapłaci, wyślij fakturę").unwrap();
        e.create_workflow_from_nlp("Gdy klient zapłaci, powiadom sprzedaż").unwrap();
        let wfs = e.workflows();
        assert_eq!(wfs.len(), 1);
        assert_eq!(wfs[0].action_names(), vec!["powiadom sprzedaż"]);
        assert_eq!(e.workflow_payloads().len(), 2);
    }

    #[test]
    fn clear_keeps_handlers() {
        let mut e = engine();
        e.execute_action("a", json!({})).unwrap();
        e.clear();
        assert_eq!(e.event_count(), 0);
        assert!(e.read_model().is_empty());
        e.execute_action("b", json!({})).unwrap();
        assert_eq!(e.read_model().len(), 1);
    }
}
