//! The latest engine snapshot, so a CLI session can pick up where the last
//! one stopped.

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use nlflow_engine::EngineSnapshot;

use crate::db::Database;
use crate::error::StoreResult;

#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store `snapshot` as the latest one and drop older rows.
    #[instrument(skip(self, snapshot), fields(events = snapshot.event_count()))]
    pub async fn save_latest(&self, snapshot: &EngineSnapshot) -> StoreResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        let schema_version = snapshot.schema_version;
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO engine_snapshots (schema_version, payload, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![schema_version, payload, Utc::now().to_rfc3339()],
                )?;
                let id = tx.last_insert_rowid();
                let pruned = tx.execute("DELETE FROM engine_snapshots WHERE id < ?1", [id])?;
                tx.commit()?;
                debug!(id, pruned, "snapshot saved");
                Ok(())
            })
            .await
    }

    /// The most recently saved snapshot, if any.
    #[instrument(skip(self))]
    pub async fn load_latest(&self) -> StoreResult<Option<EngineSnapshot>> {
        self.db
            .execute(|conn| {
                let payload: Option<String> = conn
                    .query_row(
                        "SELECT payload FROM engine_snapshots ORDER BY id DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(payload.map(|p| serde_json::from_str::<EngineSnapshot>(&p)).transpose()?)
            })
            .await
    }

    /// Forget every stored snapshot.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> StoreResult<()> {
        self.db
            .execute(|conn| {
                conn.execute("DELETE FROM engine_snapshots", [])?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlflow_engine::{Event, NewEvent};
    use serde_json::json;

    #[tokio::test]
    async fn latest_wins() {
        let store = SnapshotStore::new(Database::in_memory_migrated().await.unwrap());
        assert!(store.load_latest().await.unwrap().is_none());

        let first = EngineSnapshot::empty();
        let mut second = EngineSnapshot::empty();
        second
            .event_store
            .push(Event::stamp(NewEvent::new("ActionExecuted", json!({"actionName": "x"}))));

        store.save_latest(&first).await.unwrap();
        store.save_latest(&second).await.unwrap();
        assert_eq!(store.load_latest().await.unwrap(), Some(second));

        store.clear().await.unwrap();
        assert!(store.load_latest().await.unwrap().is_none());
    }
}
