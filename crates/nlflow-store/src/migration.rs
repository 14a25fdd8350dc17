//! Versioned schema migrations.
//!
//! Each migration runs once inside its own transaction and is recorded in
//! the `_migrations` table.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order.  Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "workflows, steps, actions and the event log",
        sql: r#"
            CREATE TABLE workflows (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                module     TEXT NOT NULL,
                source     TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE steps (
                id          TEXT NOT NULL,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                module      TEXT NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (workflow_id, id)
            );

            CREATE TABLE actions (
                id          TEXT NOT NULL,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                step_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                module      TEXT NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (workflow_id, id)
            );
            CREATE INDEX idx_actions_step ON actions(workflow_id, step_id);

            CREATE TABLE events (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                type        TEXT NOT NULL,
                action_name TEXT,
                payload     TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                metadata    TEXT NOT NULL
            );
            CREATE INDEX idx_events_type ON events(type);
            CREATE INDEX idx_events_timestamp ON events(timestamp);
        "#,
    },
    Migration {
        version: 2,
        description: "numeric conditions",
        sql: r#"
            CREATE TABLE conditions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow_id TEXT NOT NULL,
                step_id     TEXT NOT NULL,
                field       TEXT NOT NULL,
                operator    TEXT NOT NULL CHECK(operator IN ('<', '>', '==')),
                value       REAL NOT NULL,
                unit        TEXT,
                raw         TEXT NOT NULL
            );
            CREATE INDEX idx_conditions_workflow ON conditions(workflow_id);
        "#,
    },
    Migration {
        version: 3,
        description: "engine snapshots for session continuity",
        sql: r#"
            CREATE TABLE engine_snapshots (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_version INTEGER NOT NULL,
                payload        TEXT NOT NULL,
                created_at     TEXT NOT NULL
            );
        "#,
    },
];

/// Apply every pending migration.  Synchronous: run it on the blocking pool.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(current_version = current, "schema is up to date");
        return Ok(());
    }

    info!(current_version = current, pending = pending.len(), "running migrations");
    for migration in pending {
        apply(conn, migration)?;
    }
    Ok(())
}

/// Latest applied version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

/// Latest version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let fail = |message: String| StoreError::Migration {
        version: migration.version,
        message,
    };
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| fail(format!("failed to begin transaction: {e}")))?;

    let result = conn
        .execute_batch(migration.sql)
        .map_err(|e| fail(format!("SQL execution failed: {e}")))
        .and_then(|()| {
            conn.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().to_rfc3339()
                ],
            )
            .map(|_| ())
            .map_err(|e| fail(format!("failed to record migration: {e}")))
        });

    match result {
        Ok(()) => conn
            .execute_batch("COMMIT;")
            .map_err(|e| fail(format!("failed to commit: {e}"))),
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}
