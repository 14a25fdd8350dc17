//! One CLI session: engine + history restored from the latest snapshot,
//! SQLite persistence, and the sentence normalizer.
//!
//! Every mutation saves a fresh snapshot so the next invocation starts
//! from the same state.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tracing::{info, warn};

use nlflow_engine::{
    BatchReport, CommandResult, CreatedWorkflow, Event, WorkflowEngine, WorkflowService,
};
use nlflow_intent::{
    LlmNormalizer, LlmOutcome, NormalizeOptions, NormalizeOutcome, SentenceNormalizer, Tier,
};
use nlflow_kernel::{ClassifierConfig, ModuleClassifier, TextSanitizer};
use nlflow_llm::{CompletionBackend, LlmClient};
use nlflow_store::{ConditionStore, Database, EventLogStore, SnapshotStore, SqliteBridge};

use crate::config::NlflowConfig;

pub struct Session {
    service: WorkflowService,
    snapshots: SnapshotStore,
    conditions: ConditionStore,
    events: EventLogStore,
    normalizer: Arc<SentenceNormalizer>,
    llm: Option<LlmNormalizer>,
    llm_fallback: bool,
}

impl Session {
    /// Open the database under `config.data_dir` and restore the latest
    /// snapshot.
    pub async fn open(config: &NlflowConfig) -> Result<Self> {
        let db = Database::open_and_migrate(config.database_path())
            .await
            .context("failed to open database")?;
        Self::with_database(config, db).await
    }

    pub async fn with_database(config: &NlflowConfig, db: Database) -> Result<Self> {
        let backend = match config.llm_client_config() {
            Some(client_config) => {
                let client = LlmClient::new(client_config).context("failed to create LLM client")?;
                Some(Arc::new(client) as Arc<dyn CompletionBackend>)
            }
            None => None,
        };
        Self::with_backend(config, db, backend).await
    }

    /// Like [`Session::with_database`] but with an explicit completion
    /// backend in place of the one described by `config.llm`.
    pub async fn with_backend(
        config: &NlflowConfig,
        db: Database,
        backend: Option<Arc<dyn CompletionBackend>>,
    ) -> Result<Self> {
        let sanitizer = Arc::new(TextSanitizer::new());
        let classifier = Arc::new(load_classifier(config.classifier.as_deref())?);

        let engine = WorkflowEngine::new(Arc::clone(&sanitizer), Arc::clone(&classifier))
            .context("failed to build workflow engine")?;
        let bridge = Arc::new(SqliteBridge::new(db.clone()));
        let mut service = WorkflowService::new(engine, config.history_max)
            .context("failed to start workflow service")?
            .with_persistence(bridge);

        let snapshots = SnapshotStore::new(db.clone());
        if let Some(snapshot) = snapshots
            .load_latest()
            .await
            .context("failed to load snapshot")?
        {
            let events = snapshot.event_count();
            if service.restore(snapshot) {
                info!(events, "session restored");
            } else {
                warn!("stored snapshot rejected, starting empty");
            }
        }

        let normalizer = Arc::new(
            SentenceNormalizer::new(sanitizer, classifier).context("failed to build normalizer")?,
        );
        let llm = backend.map(|backend| LlmNormalizer::new(backend, Arc::clone(&normalizer)));

        Ok(Self {
            service,
            snapshots,
            conditions: ConditionStore::new(db.clone()),
            events: EventLogStore::new(db),
            normalizer,
            llm,
            llm_fallback: config.llm.enabled,
        })
    }

    pub fn engine(&self) -> &WorkflowEngine {
        self.service.engine()
    }

    pub fn can_undo(&self) -> bool {
        self.service.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.service.history().can_redo()
    }

    // -- Normalization -------------------------------------------------------

    /// Normalize `text`.  With `force_llm` the heuristic tiers are skipped;
    /// otherwise the LLM is only consulted when enabled and the tiers either
    /// fail or fall through to the last-resort split.  A failed fallback
    /// keeps the heuristic outcome.
    pub async fn normalize(
        &self,
        text: &str,
        options: &NormalizeOptions,
        force_llm: bool,
    ) -> Result<NormalizeOutcome> {
        if force_llm {
            return self.normalize_llm(text, options).await;
        }
        let fallback = self.llm_fallback && self.llm.is_some();
        match self.normalizer.normalize(text, options) {
            Ok(outcome) if fallback && !is_usable(&outcome) => {
                info!(tier = ?outcome.tier, "weak heuristic split, trying LLM");
                match self.normalize_llm(text, options).await {
                    Ok(refined) => Ok(refined),
                    Err(e) => {
                        warn!(error = %e, "LLM fallback failed, keeping heuristic split");
                        Ok(outcome)
                    }
                }
            }
            Ok(outcome) => Ok(outcome),
            Err(e) if fallback => {
                warn!(error = %e, "heuristic normalization failed, trying LLM");
                self.normalize_llm(text, options).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn normalize_llm(&self, text: &str, options: &NormalizeOptions) -> Result<NormalizeOutcome> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| anyhow!("no LLM provider configured (set OPENAI_API_KEY or use ollama)"))?;
        match llm.normalize(text, options).await {
            LlmOutcome::Normalized(outcome) => Ok(*outcome),
            LlmOutcome::Failed { error } => bail!("LLM normalization failed: {error}"),
        }
    }

    // -- Mutations -----------------------------------------------------------

    /// Record a normalizer outcome as a workflow and keep its numeric
    /// conditions.
    pub async fn record_outcome(&mut self, outcome: &NormalizeOutcome) -> Result<CreatedWorkflow> {
        let created = self.service.create_from_outcome(outcome).await?;
        let step_id = &created.step.id;
        self.conditions
            .save_all(step_id, step_id, &outcome.normalized.numeric_conditions)
            .await
            .context("failed to store numeric conditions")?;
        self.save().await?;
        Ok(created)
    }

    pub async fn create(&mut self, sentence: &str) -> Result<CreatedWorkflow> {
        let created = self.service.create_workflow(sentence).await;
        // The failure event is part of the log too.
        self.save().await?;
        Ok(created?)
    }

    pub async fn batch(&mut self, text: &str) -> Result<BatchReport> {
        let report = self.service.create_batch(text).await;
        self.save().await?;
        Ok(report)
    }

    pub async fn execute(&mut self, action: &str, context: Value) -> Result<CommandResult> {
        let result = self.service.execute_action(action, context).await;
        self.save().await?;
        Ok(result?)
    }

    pub async fn undo(&mut self) -> Result<bool> {
        let undone = self.service.undo();
        if undone {
            self.save().await?;
        }
        Ok(undone)
    }

    pub async fn redo(&mut self) -> Result<bool> {
        let redone = self.service.redo();
        if redone {
            self.save().await?;
        }
        Ok(redone)
    }

    // -- Queries -------------------------------------------------------------

    /// Events from the durable log (survives undo).
    pub async fn stored_events(&self, event_type: Option<&str>, limit: Option<usize>) -> Result<Vec<Event>> {
        self.events
            .list_events(event_type, limit)
            .await
            .context("failed to read event log")
    }

    async fn save(&self) -> Result<()> {
        self.snapshots
            .save_latest(&self.service.engine().export_state())
            .await
            .context("failed to save snapshot")
    }
}

/// A heuristic outcome worth keeping without asking the LLM.
fn is_usable(outcome: &NormalizeOutcome) -> bool {
    outcome.tier != Tier::LastResort && !outcome.normalized.actions.is_empty()
}

fn load_classifier(path: Option<&Path>) -> Result<ModuleClassifier> {
    let mut classifier = ModuleClassifier::new();
    let Some(path) = path else {
        return Ok(classifier);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read classifier table {}", path.display()))?;
    let table: ClassifierConfig = serde_json::from_str(&text)
        .with_context(|| format!("invalid classifier table {}", path.display()))?;
    if !classifier.import_config(table) {
        warn!(path = %path.display(), "classifier table has no modules, keeping built-ins");
    }
    Ok(classifier)
}
