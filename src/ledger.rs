//! Upload Ledger: append-only history of publish attempts.

use crate::store::{Database, StoreError, from_db_time, to_db_time};
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::{debug, info, warn};

/// Result of one publish attempt. A remote id exists only on success and an
/// error only on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { remote_id: String },
    Failure { error: String },
}

impl UploadOutcome {
    pub fn success(remote_id: impl Into<String>) -> Self {
        UploadOutcome::Success {
            remote_id: remote_id.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        UploadOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            UploadOutcome::Success { remote_id } => Some(remote_id),
            UploadOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            UploadOutcome::Success { .. } => None,
            UploadOutcome::Failure { error } => Some(error),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            UploadOutcome::Success { .. } => "success",
            UploadOutcome::Failure { .. } => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub id: i64,
    pub topic_id: i64,
    pub outcome: UploadOutcome,
    pub created_at: DateTime<Utc>,
}

struct UploadRow {
    id: i64,
    topic_id: i64,
    outcome: String,
    remote_id: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl UploadRow {
    fn into_record(self) -> Result<UploadRecord, StoreError> {
        let outcome = match (self.outcome.as_str(), self.remote_id, self.error) {
            ("success", Some(remote_id), None) => UploadOutcome::Success { remote_id },
            ("failure", None, Some(error)) => UploadOutcome::Failure { error },
            (kind, _, _) => {
                return Err(StoreError::CorruptRow {
                    table: "uploads",
                    detail: format!("record {} has inconsistent {kind:?} outcome", self.id),
                });
            }
        };
        Ok(UploadRecord {
            id: self.id,
            topic_id: self.topic_id,
            outcome,
            created_at: from_db_time("uploads", &self.created_at)?,
        })
    }
}

impl Database {
    /// Appends one publish attempt and returns its record id.
    pub fn record(
        &self,
        topic_id: i64,
        outcome: &UploadOutcome,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        let topic_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM topics WHERE id = ?1)",
            [topic_id],
            |row| row.get(0),
        )?;
        if !topic_exists {
            return Err(StoreError::TopicNotFound { id: topic_id });
        }

        if outcome.is_success() {
            let published: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM uploads WHERE topic_id = ?1 AND outcome = 'success')",
                [topic_id],
                |row| row.get(0),
            )?;
            if published {
                warn!("Refusing second successful upload record for topic {}", topic_id);
                return Err(StoreError::AlreadyPublished { topic_id });
            }
        }

        tx.execute(
            "INSERT INTO uploads (topic_id, outcome, remote_id, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                topic_id,
                outcome.kind(),
                outcome.remote_id(),
                outcome.error(),
                to_db_time(at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        match outcome {
            UploadOutcome::Success { remote_id } => {
                info!("Recorded upload {} for topic {}: {}", id, topic_id, remote_id)
            }
            UploadOutcome::Failure { error } => {
                debug!("Recorded failed upload {} for topic {}: {}", id, topic_id, error)
            }
        }
        Ok(id)
    }

    /// Most recent attempts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic_id, outcome, remote_id, error, created_at
             FROM uploads
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(UploadRow {
                    id: row.get(0)?,
                    topic_id: row.get(1)?,
                    outcome: row.get(2)?,
                    remote_id: row.get(3)?,
                    error: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(UploadRow::into_record).collect()
    }

    pub fn has_successful_upload(&self, topic_id: i64) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM uploads WHERE topic_id = ?1 AND outcome = 'success')",
            [topic_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::NewTopic;
    use chrono::{Duration, TimeZone};

    fn db_with_topics(n: usize) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let topics: Vec<NewTopic> = (1..=n)
            .map(|i| NewTopic::new(format!("topic {i}"), "Math Basics"))
            .collect();
        db.insert_batch(&topics).unwrap();
        db
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn failure_then_success_flips_publish_check() {
        let db = db_with_topics(5);
        db.record(5, &UploadOutcome::failure("quota exceeded"), at(0))
            .unwrap();
        assert!(!db.has_successful_upload(5).unwrap());

        db.record(5, &UploadOutcome::success("abc"), at(1)).unwrap();
        assert!(db.has_successful_upload(5).unwrap());
        assert!(!db.has_successful_upload(4).unwrap());
    }

    #[test]
    fn recent_lists_newest_first() {
        let db = db_with_topics(3);
        let mut ids = Vec::new();
        ids.push(db.record(1, &UploadOutcome::failure("timeout"), at(0)).unwrap());
        ids.push(db.record(1, &UploadOutcome::success("vid-1"), at(1)).unwrap());
        ids.push(db.record(2, &UploadOutcome::success("vid-2"), at(2)).unwrap());
        ids.push(db.record(3, &UploadOutcome::failure("auth"), at(3)).unwrap());

        let all = db.recent(10).unwrap();
        let listed: Vec<i64> = all.iter().map(|r| r.id).collect();
        let expected: Vec<i64> = ids.iter().rev().copied().collect();
        assert_eq!(listed, expected);

        for n in 1..=ids.len() {
            let window = db.recent(n).unwrap();
            assert_eq!(window.len(), n);
            assert_eq!(window[0].id, *ids.last().unwrap());
        }

        assert_eq!(all[0].outcome, UploadOutcome::failure("auth"));
        assert_eq!(all[0].created_at, at(3));
        assert_eq!(all[2].outcome.remote_id(), Some("vid-1"));
    }

    #[test]
    fn second_success_for_a_topic_is_rejected() {
        let db = db_with_topics(1);
        db.record(1, &UploadOutcome::success("first"), at(0)).unwrap();
        assert!(matches!(
            db.record(1, &UploadOutcome::success("second"), at(1)),
            Err(StoreError::AlreadyPublished { topic_id: 1 })
        ));
        db.record(1, &UploadOutcome::failure("late retry"), at(2))
            .unwrap();
        assert_eq!(db.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn record_for_unknown_topic_fails() {
        let db = db_with_topics(1);
        assert!(matches!(
            db.record(99, &UploadOutcome::failure("x"), at(0)),
            Err(StoreError::TopicNotFound { id: 99 })
        ));
        assert!(db.recent(10).unwrap().is_empty());
    }

    #[test]
    fn records_are_append_only() {
        let db = db_with_topics(1);
        let id = db.record(1, &UploadOutcome::failure("boom"), at(0)).unwrap();

        let update = db.conn.execute(
            "UPDATE uploads SET error = 'rewritten' WHERE id = ?1",
            [id],
        );
        assert!(update.is_err());
        let delete = db.conn.execute("DELETE FROM uploads WHERE id = ?1", [id]);
        assert!(delete.is_err());

        assert_eq!(db.recent(1).unwrap()[0].outcome, UploadOutcome::failure("boom"));
    }
}
