//! Database module for Aureon Core
//!
//! Provides SQLite storage for encrypted credential overrides and the
//! integration sync log. Values in the `credentials` table are opaque
//! envelopes produced by [`crate::crypto::CredentialCipher`]; this layer
//! never sees plaintext secrets.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// Connection pooling
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// A stored credential row. `value` is the encrypted envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: String,
}

/// A sync audit log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub action: String,
    pub status: String,
    pub records_processed: i64,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Thread-safe SQLite access via an r2d2 connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Open (or create) a file-backed database.
    pub fn new(db_path: PathBuf) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(&db_path);

        let pool = Pool::builder()
            .max_size(10)
            .min_idle(Some(2))
            .connection_timeout(std::time::Duration::from_secs(10))
            .build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder()
            .max_size(1) // a single shared connection keeps :memory: data visible
            .build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn init_schema(conn: &Connection) -> DbResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;

        conn.execute_batch(include_str!("schema.sql"))?;
        Self::run_migrations(conn)?;
        Ok(())
    }

    /// Run migrations for existing databases. Idempotent.
    fn run_migrations(conn: &Connection) -> DbResult<()> {
        // Migration 1: add description column to credentials if not exists
        let has_description: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('credentials') WHERE name = 'description'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_description {
            log::info!("Running migration: adding description column to credentials");
            conn.execute("ALTER TABLE credentials ADD COLUMN description TEXT", [])?;
        }

        Ok(())
    }

    /// Get a connection from the pool
    #[inline]
    fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    /// Insert or replace the encrypted value for a key.
    ///
    /// The unique-key constraint guarantees at most one row per key.
    pub fn upsert_credential(
        &self,
        key: &str,
        envelope: &str,
        description: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO credentials (key, value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 description = COALESCE(excluded.description, credentials.description),
                 updated_at = excluded.updated_at",
            params![key, envelope, description, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch the stored credential row for a key, if any.
    pub fn get_credential(&self, key: &str) -> DbResult<Option<CredentialRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT key, value, description, updated_at FROM credentials WHERE key = ?1",
                [key],
                |row| {
                    Ok(CredentialRecord {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        description: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Delete the stored row for a key. Returns whether a row existed.
    ///
    /// Environment fallbacks are untouched by design; deletion only
    /// removes the database override.
    pub fn delete_credential(&self, key: &str) -> DbResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute("DELETE FROM credentials WHERE key = ?1", [key])?;
        Ok(changed > 0)
    }

    /// List all stored credential rows.
    pub fn list_credentials(&self) -> DbResult<Vec<CredentialRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, description, updated_at FROM credentials ORDER BY key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CredentialRecord {
                key: row.get(0)?,
                value: row.get(1)?,
                description: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // SYNC LOG
    // =========================================================================

    /// Append an entry to the sync audit log.
    pub fn log_sync(
        &self,
        action: &str,
        status: &str,
        records_processed: i64,
        error_message: Option<&str>,
    ) -> DbResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO sync_log (action, status, records_processed, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                action,
                status,
                records_processed,
                error_message,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent sync log entries, newest first.
    pub fn recent_sync_logs(&self, limit: i64) -> DbResult<Vec<SyncLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, action, status, records_processed, error_message, created_at
             FROM sync_log ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(SyncLogEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                status: row.get(2)?,
                records_processed: row.get(3)?,
                error_message: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
