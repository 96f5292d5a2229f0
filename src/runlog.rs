//! Persistent operator log kept next to the topic bookkeeping.

use crate::store::{Database, StoreError, from_db_time, to_db_time};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_db(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(StoreError::CorruptRow {
                table: "run_log",
                detail: format!("unknown level {other:?}"),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub fn log_event(
        &self,
        level: LogLevel,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO run_log (level, message, created_at) VALUES (?1, ?2, ?3)",
            params![level.as_str(), message, to_db_time(at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, level, message, created_at
             FROM run_log
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, level, message, created_at)| {
                Ok(LogEntry {
                    id,
                    level: LogLevel::from_db(&level)?,
                    message,
                    created_at: from_db_time("run_log", &created_at)?,
                })
            })
            .collect()
    }

    /// Deletes entries created before `cutoff`, returning how many went.
    pub fn prune_logs(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "DELETE FROM run_log WHERE created_at < ?1",
            [to_db_time(cutoff)],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn logs_list_newest_first_and_prune_by_age() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        db.log_event(LogLevel::Info, "generated 200 topics", base - Duration::days(40))
            .unwrap();
        db.log_event(LogLevel::Error, "upload failed", base - Duration::days(2))
            .unwrap();
        db.log_event(LogLevel::Info, "uploaded abc", base).unwrap();

        let entries = db.recent_logs(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "uploaded abc");
        assert_eq!(entries[1].level, LogLevel::Error);

        let removed = db.prune_logs(base - Duration::days(30)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.recent_logs(10).unwrap().len(), 2);
    }

    #[test]
    fn level_displays_uppercase() {
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }
}
