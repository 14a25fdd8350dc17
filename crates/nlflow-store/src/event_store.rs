//! Durable copy of the engine's event log.
//!
//! Events are written once (by id) and never updated.  `action_name` is
//! lifted out of the payload so action history can be queried without
//! parsing JSON.

use chrono::SecondsFormat;
use serde_json::Value;
use tracing::{debug, instrument};

use nlflow_engine::{Event, EventMetadata};

use crate::db::Database;
use crate::error::StoreResult;

#[derive(Clone)]
pub struct EventLogStore {
    db: Database,
}

impl EventLogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store one event.  Returns `false` if an event with the same id was
    /// already stored.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn save_event(&self, event: &Event) -> StoreResult<bool> {
        let row = EventRow::encode(event)?;
        self.db
            .execute(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO events (id, type, action_name, payload, timestamp, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        row.id,
                        row.event_type,
                        row.action_name,
                        row.payload,
                        row.timestamp,
                        row.metadata
                    ],
                )?;
                debug!(inserted, "event saved");
                Ok(inserted > 0)
            })
            .await
    }

    /// Store many events in one transaction.  Returns how many were new.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn save_all(&self, events: &[Event]) -> StoreResult<usize> {
        let rows = events
            .iter()
            .map(EventRow::encode)
            .collect::<StoreResult<Vec<_>>>()?;
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                for row in rows {
                    inserted += tx.execute(
                        "INSERT OR IGNORE INTO events (id, type, action_name, payload, timestamp, metadata) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            row.id,
                            row.event_type,
                            row.action_name,
                            row.payload,
                            row.timestamp,
                            row.metadata
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
    }

    /// The most recent `limit` events (all when `None`), optionally of one
    /// type, returned oldest first.
    #[instrument(skip(self))]
    pub async fn list_events(
        &self,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Event>> {
        let event_type = event_type.map(str::to_owned);
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, type, payload, metadata FROM ( \
                         SELECT seq, id, type, payload, metadata FROM events \
                         WHERE (?1 IS NULL OR type = ?1) \
                         ORDER BY seq DESC LIMIT ?2 \
                     ) ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![event_type, limit], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, event_type, payload, metadata)| -> StoreResult<Event> {
                        Ok(Event {
                            id,
                            event_type,
                            payload: serde_json::from_str(&payload)?,
                            metadata: serde_json::from_str::<EventMetadata>(&metadata)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?))
            .await
    }
}

struct EventRow {
    id: String,
    event_type: String,
    action_name: Option<String>,
    payload: String,
    timestamp: String,
    metadata: String,
}

impl EventRow {
    fn encode(event: &Event) -> StoreResult<Self> {
        Ok(Self {
            id: event.id.clone(),
            event_type: event.event_type.clone(),
            action_name: event
                .payload
                .get("actionName")
                .and_then(Value::as_str)
                .map(str::to_owned),
            payload: serde_json::to_string(&event.payload)?,
            // Fixed-width so the text column sorts chronologically.
            timestamp: event
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            metadata: serde_json::to_string(&event.metadata)?,
        })
    }
}
