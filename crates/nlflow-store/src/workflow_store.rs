//! Workflow persistence.
//!
//! A workflow is stored as one `workflows` row, one `steps` row and one
//! `actions` row per action.  [`WorkflowStore::upsert`] replaces all three
//! for the workflow id; nothing is merged.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use nlflow_kernel::{Action, Step};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWorkflow {
    pub step: Step,
    /// Where the workflow came from (`NLP`, `Normalizer`, `LLM`).
    pub source: Option<String>,
    /// First time this id was stored.  Survives upserts.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct WorkflowRow {
    id: String,
    name: String,
    module: String,
    source: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            module: row.get(2)?,
            source: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_stored(self, actions: Vec<Action>) -> StoreResult<StoredWorkflow> {
        Ok(StoredWorkflow {
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            step: Step {
                id: self.id,
                name: self.name,
                module: self.module,
                actions,
            },
            source: self.source,
        })
    }
}

pub(crate) fn parse_time(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            entity: "timestamp",
            reason: format!("`{text}`: {e}"),
        })
}

const SELECT_WORKFLOW: &str =
    "SELECT id, name, module, source, created_at, updated_at FROM workflows";

fn load_actions(conn: &Connection, workflow_id: &str) -> StoreResult<Vec<Action>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, module FROM actions WHERE workflow_id = ?1 ORDER BY position",
    )?;
    let actions = stmt
        .query_map([workflow_id], |row| {
            Ok(Action {
                id: row.get(0)?,
                name: row.get(1)?,
                module: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(actions)
}

// ═══════════════════════════════════════════════════════════════════════
//  WorkflowStore
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or fully replace the workflow with `step.id`.
    #[instrument(skip(self, step), fields(workflow_id = %step.id))]
    pub async fn upsert(&self, step: &Step, source: Option<&str>) -> StoreResult<()> {
        let step = step.clone();
        let source = source.map(str::to_owned);
        let now = Utc::now().to_rfc3339();

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO workflows (id, name, module, source, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, module = excluded.module, \
                     source = excluded.source, updated_at = excluded.updated_at",
                    rusqlite::params![step.id, step.name, step.module, source, now],
                )?;
                tx.execute("DELETE FROM actions WHERE workflow_id = ?1", [&step.id])?;
                tx.execute("DELETE FROM steps WHERE workflow_id = ?1", [&step.id])?;
                tx.execute(
                    "INSERT INTO steps (id, workflow_id, name, module, position) VALUES (?1, ?1, ?2, ?3, 0)",
                    rusqlite::params![step.id, step.name, step.module],
                )?;
                for (position, action) in step.actions.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO actions (id, workflow_id, step_id, name, module, position) \
                         VALUES (?1, ?2, ?2, ?3, ?4, ?5)",
                        rusqlite::params![action.id, step.id, action.name, action.module, position as i64],
                    )?;
                }
                tx.commit()?;
                debug!(workflow_id = %step.id, actions = step.actions.len(), "workflow upserted");
                Ok(())
            })
            .await
    }

    /// Fetch one workflow, `None` if the id is unknown.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<StoredWorkflow>> {
        let id = id.to_owned();
        self.db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        &format!("{SELECT_WORKFLOW} WHERE id = ?1"),
                        [&id],
                        WorkflowRow::from_row,
                    )
                    .optional()?;
                match row {
                    Some(row) => {
                        let actions = load_actions(conn, &row.id)?;
                        row.into_stored(actions).map(Some)
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    /// Every workflow, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> StoreResult<Vec<StoredWorkflow>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_WORKFLOW} ORDER BY updated_at DESC, id"))?;
                let rows = stmt
                    .query_map([], WorkflowRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter()
                    .map(|row| {
                        let actions = load_actions(conn, &row.id)?;
                        row.into_stored(actions)
                    })
                    .collect()
            })
            .await
    }

    /// Delete a workflow and its steps and actions.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_owned();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute("DELETE FROM workflows WHERE id = ?1", [&id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "workflow",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM workflows", [], |row| row.get(0))?))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use nlflow_kernel::{ModuleClassifier, TextSanitizer};

    fn step(condition: &str, actions: &[&str]) -> Step {
        Step::build(
            condition,
            actions,
            &TextSanitizer::new(),
            &ModuleClassifier::new(),
        )
    }

    async fn store() -> WorkflowStore {
        WorkflowStore::new(Database::in_memory_migrated().await.unwrap())
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let store = store().await;
        let s = step("klient zapłaci", &["wyślij fakturę", "powiadom sprzedaż"]);
        store.upsert(&s, Some("NLP")).await.unwrap();

        let loaded = store.get("klient_zaplaci").await.unwrap().unwrap();
        assert_eq!(loaded.step, s);
        assert_eq!(loaded.source.as_deref(), Some("NLP"));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_actions() {
        let store = store().await;
        store
            .upsert(&step("klient zapłaci", &["a", "b", "c"]), None)
            .await
            .unwrap();
        let first = store.get("klient_zaplaci").await.unwrap().unwrap();

        let replacement = step("klient zapłaci", &["d"]);
        store.upsert(&replacement, Some("Normalizer")).await.unwrap();

        let loaded = store.get("klient_zaplaci").await.unwrap().unwrap();
        assert_eq!(loaded.step.action_names(), vec!["d"]);
        assert_eq!(loaded.created_at, first.created_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = store().await;
        store.upsert(&step("x", &["y"]), None).await.unwrap();
        store.delete("x").await.unwrap();
        assert!(matches!(
            store.delete("x").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.list().await.unwrap().is_empty());
    }
}
