use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use firstprompt_common::{Error, Result, SuggestedMessage};
use rusqlite::{Connection, params};
use tracing::{debug, error, info};

use crate::migrations;

const INSERT_MESSAGE: &str = "INSERT INTO ai_chat_suggested_first_message (
        uuid, created_on, message, language_id, country_id, grade_id, subject_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(uuid) DO NOTHING";

/// Outcome of a best-effort bulk upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub imported: usize,
    /// Rows whose uuid was already present.
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl UploadReport {
    pub fn print_summary(&self) {
        println!(
            "Upload: {} imported, {} skipped, {} errors",
            self.imported,
            self.skipped,
            self.errors.len()
        );
        for e in &self.errors {
            println!("  - {e}");
        }
    }
}

/// Relational sink for suggested first messages, keyed by uuid.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening message store at {}", db_path.display());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Persistence(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Persistence(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Persistence(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.connection()?;
        migrations::run(&conn)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("message database lock poisoned".into()))
    }

    /// Round-trip a trivial query.
    pub fn test_connection(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Persistence(format!("connection check failed: {e}")))?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM ai_chat_suggested_first_message",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Persistence(format!("failed to count messages: {e}")))?;
        Ok(count as usize)
    }

    /// Insert `records` in transactions of `batch_size` rows.
    ///
    /// Rows whose uuid already exists are left untouched and counted as
    /// skipped, so re-uploading a checkpoint is a no-op. A failing batch is
    /// rolled back and reported in [`UploadReport::errors`]; later batches
    /// still run.
    pub fn upload(&self, records: &[SuggestedMessage], batch_size: usize) -> Result<UploadReport> {
        let mut conn = self.connection()?;
        let mut report = UploadReport::default();

        for (n, batch) in records.chunks(batch_size.max(1)).enumerate() {
            let number = n + 1;
            match insert_batch(&mut conn, batch) {
                Ok(inserted) => {
                    report.imported += inserted;
                    report.skipped += batch.len() - inserted;
                    if inserted < batch.len() {
                        debug!(
                            "batch {number}: {} rows already present",
                            batch.len() - inserted
                        );
                    }
                }
                Err(e) => {
                    error!("batch {number} failed: {e}");
                    report.errors.push(format!("batch {number} failed: {e}"));
                }
            }
        }

        info!(
            "uploaded {} messages ({} skipped, {} failed batches)",
            report.imported,
            report.skipped,
            report.errors.len()
        );
        Ok(report)
    }
}

fn insert_batch(conn: &mut Connection, batch: &[SuggestedMessage]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(INSERT_MESSAGE)?;
        for message in batch {
            inserted += stmt.execute(params![
                message.uuid.to_string(),
                message.created_on.to_rfc3339(),
                message.message,
                message.language_id,
                message.country_id,
                message.grade_id,
                message.subject_id,
            ])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}
