//! Engine, history and persistence wired together.
//!
//! Every successful mutation follows the same sequence: run the command,
//! hand the new events (and workflow, if any) to the persistence bridge,
//! then push a snapshot onto the history.  Undo and redo restore whole
//! engine snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use nlflow_intent::{NormalizeOutcome, SentenceParser};
use nlflow_kernel::Step;

use crate::engine::WorkflowEngine;
use crate::error::{EngineError, Result};
use crate::event::{CommandResult, Event, WORKFLOW_CREATED};
use crate::handlers::WorkflowPayload;
use crate::history::HistoryManager;
use crate::snapshot::EngineSnapshot;

/// Source tag for steps produced by the LLM fallback.
pub const SOURCE_LLM: &str = "LLM";

/// Durable storage for workflows and events.
///
/// `upsert_workflow` replaces any stored workflow with the same id.
#[async_trait]
pub trait PersistenceBridge: Send + Sync {
    async fn upsert_workflow(&self, step: &Step, source: Option<&str>) -> Result<()>;

    async fn save_event(&self, event: &Event) -> Result<()>;
}

/// A workflow created through the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedWorkflow {
    pub result: CommandResult,
    pub step: Step,
    /// `false` when a persistence bridge is configured but rejected a write.
    pub persisted: bool,
}

/// A sentence from a batch that could not be turned into a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub sentence: String,
    pub error: String,
}

/// Result of [`WorkflowService::create_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub created: Vec<CreatedWorkflow>,
    pub failed: Vec<BatchFailure>,
}

pub struct WorkflowService {
    engine: WorkflowEngine,
    history: HistoryManager<EngineSnapshot>,
    parser: SentenceParser,
    persistence: Option<Arc<dyn PersistenceBridge>>,
}

impl WorkflowService {
    /// Wrap an engine.  Its current state becomes the first history entry.
    pub fn new(engine: WorkflowEngine, history_max: usize) -> Result<Self> {
        let mut history = HistoryManager::new(history_max);
        history.snapshot(&engine.export_state());
        Ok(Self {
            engine,
            history,
            parser: SentenceParser::new()?,
            persistence: None,
        })
    }

    pub fn with_persistence(mut self, bridge: Arc<dyn PersistenceBridge>) -> Self {
        self.persistence = Some(bridge);
        self
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Direct engine access.  Changes made here are not snapshotted.
    pub fn engine_mut(&mut self) -> &mut WorkflowEngine {
        &mut self.engine
    }

    pub fn history(&self) -> &HistoryManager<EngineSnapshot> {
        &self.history
    }

    // -- Mutations -----------------------------------------------------------

    /// Create a workflow from a `"<marker> condition, actions"` sentence.
    pub async fn create_workflow(&mut self, sentence: &str) -> Result<CreatedWorkflow> {
        let from = self.engine.event_count();
        let outcome = self.engine.create_workflow_from_nlp(sentence);
        self.finish_create(from, outcome).await
    }

    /// Create a workflow from a normalizer outcome.
    pub async fn create_from_outcome(&mut self, outcome: &NormalizeOutcome) -> Result<CreatedWorkflow> {
        let source = if outcome.llm {
            SOURCE_LLM
        } else {
            crate::handlers::SOURCE_NORMALIZER
        };
        let from = self.engine.event_count();
        let result = self.engine.create_workflow_from_step(&outcome.step, source);
        self.finish_create(from, result).await
    }

    async fn finish_create(
        &mut self,
        from: usize,
        outcome: Result<CommandResult>,
    ) -> Result<CreatedWorkflow> {
        let mut persisted = self.persist_events_since(from).await;
        let result = outcome?;

        let WorkflowPayload { step, source } = self
            .engine
            .events()
            .into_iter()
            .skip(from)
            .find(|e| e.event_type == WORKFLOW_CREATED)
            .map(|e| serde_json::from_value::<WorkflowPayload>(e.payload))
            .transpose()?
            .ok_or_else(|| EngineError::Handler {
                command_type: WORKFLOW_CREATED.into(),
                reason: "command produced no workflow".into(),
            })?;

        if let Some(bridge) = self.persistence.clone()
            && let Err(e) = bridge.upsert_workflow(&step, source.as_deref()).await
        {
            warn!(workflow_id = %step.id, error = %e, "workflow upsert failed");
            persisted = false;
        }

        self.history.snapshot(&self.engine.export_state());
        info!(workflow_id = %step.id, module = %step.module, "workflow created");
        Ok(CreatedWorkflow {
            result,
            step,
            persisted,
        })
    }

    /// Record an action execution.
    pub async fn execute_action(&mut self, action_name: &str, context: Value) -> Result<CommandResult> {
        let from = self.engine.event_count();
        let outcome = self.engine.execute_action(action_name, context);
        self.persist_events_since(from).await;
        let result = outcome?;
        self.history.snapshot(&self.engine.export_state());
        Ok(result)
    }

    /// Create one workflow per strict sentence found in `text`.
    ///
    /// Failures are collected, not returned; later sentences still run.
    pub async fn create_batch(&mut self, text: &str) -> BatchReport {
        let mut report = BatchReport::default();
        for sentence in self.parser.parse_multiple_sentences(text) {
            match self.create_workflow(&sentence).await {
                Ok(created) => report.created.push(created),
                Err(e) => report.failed.push(BatchFailure {
                    sentence,
                    error: e.to_string(),
                }),
            }
        }
        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            "batch processed"
        );
        report
    }

    /// Hand every event appended since `from` to the bridge.  Returns
    /// `false` if any write failed.
    async fn persist_events_since(&self, from: usize) -> bool {
        let Some(bridge) = self.persistence.clone() else {
            return true;
        };
        let mut ok = true;
        for event in self.engine.events().into_iter().skip(from) {
            if let Err(e) = bridge.save_event(&event).await {
                warn!(event_id = %event.id, error = %e, "event persistence failed");
                ok = false;
            }
        }
        ok
    }

    // -- History -------------------------------------------------------------

    /// Restore the previous snapshot.  `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => self.engine.import_state(snapshot),
            None => false,
        }
    }

    /// Restore the next snapshot.  `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => self.engine.import_state(snapshot),
            None => false,
        }
    }

    /// Load a saved snapshot and restart the history from it.
    pub fn restore(&mut self, snapshot: EngineSnapshot) -> bool {
        if !self.engine.import_state(snapshot) {
            return false;
        }
        self.history.clear();
        self.history.snapshot(&self.engine.export_state());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use nlflow_kernel::{ModuleClassifier, TextSanitizer};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        workflows: Mutex<Vec<Step>>,
        events: Mutex<Vec<String>>,
        fail_upserts: bool,
    }

    #[async_trait]
    impl PersistenceBridge for Recorder {
        async fn upsert_workflow(&self, step: &Step, _source: Option<&str>) -> Result<()> {
            if self.fail_upserts {
                return Err(EngineError::Persistence {
                    reason: "disk full".into(),
                });
            }
            self.workflows.lock().unwrap().push(step.clone());
            Ok(())
        }

        async fn save_event(&self, event: &Event) -> Result<()> {
            self.events.lock().unwrap().push(event.event_type.clone());
            Ok(())
        }
    }

    fn service() -> WorkflowService {
        let engine = WorkflowEngine::new(
            Arc::new(TextSanitizer::new()),
            Arc::new(ModuleClassifier::new()),
        )
        .unwrap();
        WorkflowService::new(engine, 10).unwrap()
    }

    #[tokio::test]
    async fn create_persists_and_snapshots() {
        let recorder = Arc::new(Recorder::default());
        let mut svc = service().with_persistence(recorder.clone());

        let created = svc
            .create_workflow("Gdy klient zapłaci, wyślij fakturę i powiadom sprzedaż")
            .await
            .unwrap();
        assert!(created.persisted);
        assert_eq!(created.step.id, "klient_zaplaci");
        assert_eq!(recorder.workflows.lock().unwrap().len(), 1);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["WorkflowCreated"]);
        assert_eq!(svc.history().len(), 2);
    }

    #[tokio::test]
    async fn failed_create_is_persisted_but_not_snapshotted() {
        let recorder = Arc::new(Recorder::default());
        let mut svc = service().with_persistence(recorder.clone());

        assert!(svc.create_workflow("bez struktury").await.is_err());
        assert_eq!(*recorder.events.lock().unwrap(), vec!["CommandFailed"]);
        assert!(recorder.workflows.lock().unwrap().is_empty());
        assert_eq!(svc.history().len(), 1);
    }

    #[tokio::test]
    async fn undo_drops_trailing_command_failure() {
        let recorder = Arc::new(Recorder::default());
        let mut svc = service().with_persistence(recorder.clone());
        svc.create_workflow("Gdy klient zapłaci, wyślij fakturę").await.unwrap();
        assert!(svc.create_workflow("bez struktury").await.is_err());
        assert_eq!(svc.engine().event_count(), 2);
        assert_eq!(svc.history().len(), 2);

        // The failure has no snapshot of its own: undo steps past it and
        // the successful create together.
        assert!(svc.undo());
        assert_eq!(svc.engine().event_count(), 0);

        assert!(svc.redo());
        assert_eq!(svc.engine().event_count(), 1);
        assert_eq!(svc.engine().statistics().commands_failed, 0);
        assert!(!svc.redo());

        // The bridge still saw both events.
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["WorkflowCreated", "CommandFailed"]
        );
    }

    #[tokio::test]
    async fn rejected_upsert_marks_not_persisted() {
        let recorder = Arc::new(Recorder {
            fail_upserts: true,
            ..Recorder::default()
        });
        let mut svc = service().with_persistence(recorder);
        let created = svc.create_workflow("Gdy x, y").await.unwrap();
        assert!(!created.persisted);
        assert_eq!(svc.engine().event_count(), 1);
    }

    #[tokio::test]
    async fn undo_and_redo_restore_engine_state() {
        let mut svc = service();
        svc.create_workflow("Gdy klient zapłaci, wyślij fakturę").await.unwrap();
        svc.execute_action("wyślij fakturę", json!({})).await.unwrap();
        assert_eq!(svc.engine().event_count(), 2);

        assert!(svc.undo());
        assert_eq!(svc.engine().event_count(), 1);
        assert!(svc.undo());
        assert_eq!(svc.engine().event_count(), 0);
        assert!(!svc.undo());

        assert!(svc.redo());
        assert!(svc.redo());
        assert_eq!(svc.engine().event_count(), 2);
        assert!(!svc.redo());
    }

    #[tokio::test]
    async fn batch_collects_created_workflows() {
        let mut svc = service();
        let report = svc
            .create_batch(
                "Gdy klient zapłaci, wyślij fakturę.\nTo zdanie jest pominięte.\nGdy nowy lead, dodaj do CRM",
            )
            .await;
        assert_eq!(report.created.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(svc.engine().workflows().len(), 2);
    }

    #[tokio::test]
    async fn restore_resets_history() {
        let mut svc = service();
        svc.create_workflow("Gdy x, y").await.unwrap();
        let saved = svc.engine().export_state();

        let mut fresh = service();
        assert!(fresh.restore(saved));
        assert_eq!(fresh.engine().event_count(), 1);
        assert_eq!(fresh.history().len(), 1);
        assert!(!fresh.undo());
    }
}
