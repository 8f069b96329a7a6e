use chrono::Utc;
use firstprompt_common::{Error, Result};
use rusqlite::{Connection, params};
use tracing::info;

/// A versioned schema change, applied once and tracked in `_migrations`.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MESSAGE_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "suggested_first_message",
    sql: "CREATE TABLE IF NOT EXISTS ai_chat_suggested_first_message (
            uuid TEXT PRIMARY KEY,
            created_on TEXT NOT NULL,
            message TEXT NOT NULL,
            language_id INTEGER,
            country_id INTEGER,
            grade_id INTEGER,
            subject_id INTEGER
        );",
};

pub const MESSAGE_SCHEMA_V2: Migration = Migration {
    version: 2,
    name: "suggested_first_message_scope_index",
    sql: "CREATE INDEX IF NOT EXISTS idx_suggested_first_message_scope
            ON ai_chat_suggested_first_message(country_id, grade_id, subject_id, language_id);",
};

pub const MIGRATIONS: &[Migration] = &[MESSAGE_SCHEMA_V1, MESSAGE_SCHEMA_V2];

/// Apply every migration newer than the recorded schema version.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| Error::Persistence(format!("failed to create migrations table: {e}")))?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Persistence(format!("failed to read schema version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql).map_err(|e| {
            Error::Persistence(format!("migration {} failed: {e}", migration.name))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)",
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Persistence(format!("failed to record migration: {e}")))?;
        info!("applied migration {} ({})", migration.version, migration.name);
    }

    Ok(())
}
