//! SQLite bookkeeping for topics, upload attempts and the run log.
//!
//! A [`Database`] is opened at the start of a pipeline run and closed when the
//! run ends. The topic, ledger and run-log operations live in `topics.rs`,
//! `ledger.rs` and `runlog.rs` as further `impl Database` blocks.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("I/O error preparing database: {0}")]
    Io(#[from] std::io::Error),

    #[error("no unused topics left")]
    NoUnusedTopics,

    #[error("topic {id} does not exist")]
    TopicNotFound { id: i64 },

    #[error("topic {topic_id} already has a successful upload")]
    AlreadyPublished { topic_id: i64 },

    #[error("corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },

    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

pub struct Database {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) the database file and brings the schema up
    /// to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.initialize()?;
        debug!("Opened database {}", path.display());
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.initialize()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.migrate()
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        if current < 1 {
            self.conn.execute_batch(SCHEMA_SQL)?;
            self.conn.execute_batch("PRAGMA user_version = 1;")?;
            info!("Initialized database schema v{}", SCHEMA_VERSION);
        }

        Ok(())
    }

    /// Closes the connection, surfacing any error the implicit drop would hide.
    pub fn close(self) -> Result<(), StoreError> {
        if let Some(path) = self.path() {
            debug!("Closing database {}", path.display());
        }
        self.conn.close().map_err(|(_, e)| StoreError::Unavailable(e))
    }
}

/// Fixed precision keeps text order identical to time order.
pub(crate) fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            detail: format!("bad timestamp {raw:?}: {e}"),
        })
}
