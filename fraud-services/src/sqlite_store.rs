//! SQLite-backed result store
//!
//! One row per award: the serialized report plus the time it was last
//! written. Checkpoints overwrite the same row.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use fraud_core::FraudError;
use fraud_research::ResultStore;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open (or create) the database file and its table
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, FraudError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FraudError::storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path).map_err(db_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self, FraudError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), FraudError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS research_reports (
                award_id TEXT PRIMARY KEY,
                report TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_error)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, FraudError> {
        self.conn
            .lock()
            .map_err(|_| FraudError::storage("Result store lock poisoned"))
    }

    /// Unix timestamp of the last write for `key`
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>, FraudError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT updated_at FROM research_reports WHERE award_id = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)
    }

    pub fn len(&self) -> Result<usize, FraudError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM research_reports", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FraudError> {
        let conn = self.lock()?;
        let report = conn
            .query_row(
                "SELECT report FROM research_reports WHERE award_id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        debug!(
            "Result store {} for {}",
            if report.is_some() { "hit" } else { "miss" },
            key
        );
        Ok(report)
    }

    async fn put(&self, key: &str, value: String) -> Result<(), FraudError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO research_reports (award_id, report, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(award_id) DO UPDATE SET report = excluded.report, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().timestamp()],
        )
        .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: rusqlite::Error) -> FraudError {
    FraudError::storage(format!("SQLite error: {}", e))
}
