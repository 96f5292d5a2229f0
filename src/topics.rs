//! Topic Store: generated lesson topics and their consumption state.

use crate::store::{Database, StoreError, from_db_time, to_db_time};
use crate::utils::collapse_whitespace;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Unused,
    Used,
}

impl TopicStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicStatus::Unused => "unused",
            TopicStatus::Used => "used",
        }
    }

    fn from_db(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "unused" => Ok(TopicStatus::Unused),
            "used" => Ok(TopicStatus::Used),
            other => Err(StoreError::CorruptRow {
                table: "topics",
                detail: format!("unknown status {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub text: String,
    pub category: String,
    pub status: TopicStatus,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A candidate produced by a topic source, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub text: String,
    pub category: String,
}

impl NewTopic {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }
}

/// Uniqueness key for topic text: trimmed, single-spaced, lowercase.
pub fn normalize_topic_text(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

struct TopicRow {
    id: i64,
    text: String,
    category: String,
    status: String,
    created_at: String,
    used_at: Option<String>,
}

impl TopicRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            category: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            used_at: row.get(5)?,
        })
    }

    fn into_topic(self) -> Result<Topic, StoreError> {
        Ok(Topic {
            id: self.id,
            text: self.text,
            category: self.category,
            status: TopicStatus::from_db(&self.status)?,
            created_at: from_db_time("topics", &self.created_at)?,
            used_at: self
                .used_at
                .as_deref()
                .map(|raw| from_db_time("topics", raw))
                .transpose()?,
        })
    }
}

const TOPIC_COLUMNS: &str = "id, text, category, status, created_at, used_at";

impl Database {
    pub fn count_unused(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM topics WHERE status = ?1",
            [TopicStatus::Unused.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_total(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Inserts every candidate whose normalized text is new and returns how
    /// many rows were added. Duplicates and blank texts are skipped.
    pub fn insert_batch(&mut self, topics: &[NewTopic]) -> Result<usize, StoreError> {
        let now = to_db_time(Utc::now());
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO topics (text, normalized, category, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for topic in topics {
                let text = collapse_whitespace(&topic.text);
                if text.is_empty() {
                    debug!("Skipping blank topic candidate");
                    continue;
                }
                let changes = stmt.execute(params![
                    text,
                    normalize_topic_text(&text),
                    collapse_whitespace(&topic.category),
                    TopicStatus::Unused.as_str(),
                    now,
                ])?;
                if changes == 0 {
                    debug!("Duplicate topic ignored: {}", text);
                }
                inserted += changes;
            }
        }
        tx.commit()?;
        info!("Inserted {} of {} topic candidates", inserted, topics.len());
        Ok(inserted)
    }

    /// Takes the oldest unused topic and marks it used at `at` in one
    /// transaction.
    pub fn reserve_next(&mut self, at: DateTime<Utc>) -> Result<Topic, StoreError> {
        let now = to_db_time(at);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM topics
                 WHERE status = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1",
                [TopicStatus::Unused.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = candidate else {
            return Err(StoreError::NoUnusedTopics);
        };

        let changes = tx.execute(
            "UPDATE topics SET status = ?2, used_at = ?3 WHERE id = ?1 AND status = ?4",
            params![
                id,
                TopicStatus::Used.as_str(),
                now,
                TopicStatus::Unused.as_str()
            ],
        )?;
        if changes == 0 {
            return Err(StoreError::NoUnusedTopics);
        }

        let row = tx.query_row(
            &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
            [id],
            TopicRow::from_row,
        )?;
        tx.commit()?;

        let topic = row.into_topic()?;
        info!("Reserved topic {} ({}): {}", topic.id, topic.category, topic.text);
        Ok(topic)
    }

    /// Marks a topic used. Already-used topics keep their original timestamp.
    pub fn mark_used_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let changes = self.conn.execute(
            "UPDATE topics SET status = ?2, used_at = ?3 WHERE id = ?1 AND status = ?4",
            params![
                id,
                TopicStatus::Used.as_str(),
                to_db_time(at),
                TopicStatus::Unused.as_str()
            ],
        )?;
        if changes == 0 && self.topic(id)?.is_none() {
            return Err(StoreError::TopicNotFound { id });
        }
        Ok(())
    }

    pub fn topic(&self, id: i64) -> Result<Option<Topic>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
                [id],
                TopicRow::from_row,
            )
            .optional()?
            .map(TopicRow::into_topic)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn batch(texts: &[&str]) -> Vec<NewTopic> {
        texts
            .iter()
            .map(|t| NewTopic::new(*t, "Good Manners"))
            .collect()
    }

    #[test]
    fn duplicate_in_batch_is_skipped() {
        let mut db = Database::open_in_memory().unwrap();
        let inserted = db
            .insert_batch(&batch(&["say please", "count to ten", "say please"]))
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(db.count_unused().unwrap(), 2);
    }

    #[test]
    fn duplicates_compare_normalized_text_across_categories() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_batch(&[NewTopic::new("Say Please", "Good Manners")])
            .unwrap();
        let before = db.count_unused().unwrap();
        let inserted = db
            .insert_batch(&[NewTopic::new("  say   PLEASE ", "Early Reading")])
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(db.count_unused().unwrap(), before);
        assert_eq!(db.count_total().unwrap(), 1);
    }

    #[test]
    fn blank_candidates_are_ignored() {
        let mut db = Database::open_in_memory().unwrap();
        let inserted = db.insert_batch(&batch(&["", "   ", "tie shoes"])).unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn single_topic_is_reserved_once() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_batch(&batch(&["wash hands"])).unwrap();

        let topic = db.reserve_next(Utc::now()).unwrap();
        assert_eq!(topic.text, "wash hands");
        assert_eq!(topic.status, TopicStatus::Used);
        assert!(topic.used_at.is_some());

        let stored = db.topic(topic.id).unwrap().unwrap();
        assert_eq!(stored.status, TopicStatus::Used);

        assert!(matches!(db.reserve_next(Utc::now()), Err(StoreError::NoUnusedTopics)));
    }

    #[test]
    fn reserve_on_empty_store_changes_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(matches!(db.reserve_next(Utc::now()), Err(StoreError::NoUnusedTopics)));
        assert_eq!(db.count_total().unwrap(), 0);
        assert_eq!(db.count_unused().unwrap(), 0);
    }

    #[test]
    fn reservations_drain_each_topic_exactly_once_oldest_first() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_batch(&batch(&["first", "second"])).unwrap();
        db.insert_batch(&batch(&["third", "fourth", "fifth"])).unwrap();
        let unused = db.count_unused().unwrap();

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        loop {
            match db.reserve_next(Utc::now()) {
                Ok(topic) => {
                    assert!(seen.insert(topic.id), "topic {} returned twice", topic.id);
                    order.push(topic.text);
                }
                Err(StoreError::NoUnusedTopics) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(seen.len() as u64, unused);
        assert_eq!(order, vec!["first", "second", "third", "fourth", "fifth"]);
        assert_eq!(db.count_unused().unwrap(), 0);
    }

    #[test]
    fn mark_used_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_batch(&batch(&["share toys"])).unwrap();
        let id = db.topic_ids_for_test()[0];

        let first = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        db.mark_used_at(id, first).unwrap();
        db.mark_used_at(id, first + chrono::Duration::hours(1)).unwrap();

        let topic = db.topic(id).unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Used);
        assert_eq!(topic.used_at, Some(first));
        assert_eq!(db.count_unused().unwrap(), 0);
    }

    #[test]
    fn mark_used_rejects_unknown_topic() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.mark_used_at(42, Utc::now()),
            Err(StoreError::TopicNotFound { id: 42 })
        ));
    }

    #[test]
    fn used_topics_cannot_revert_or_be_deleted() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_batch(&batch(&["brush teeth"])).unwrap();
        let topic = db.reserve_next(Utc::now()).unwrap();

        let revert = db.conn.execute(
            "UPDATE topics SET status = 'unused' WHERE id = ?1",
            [topic.id],
        );
        assert!(revert.is_err());

        let delete = db.conn.execute("DELETE FROM topics WHERE id = ?1", [topic.id]);
        assert!(delete.is_err());
    }

    impl Database {
        fn topic_ids_for_test(&self) -> Vec<i64> {
            let mut stmt = self.conn.prepare("SELECT id FROM topics ORDER BY id").unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<Vec<i64>, _>>()
                .unwrap()
        }
    }
}
