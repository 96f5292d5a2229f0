//! One pipeline run: ensure topic supply, reserve a topic, generate the
//! lesson, render, publish, record the outcome and clean up.

use crate::interface::{
    LessonSource, PublishError, Publisher, RenderError, Renderer, Retryable, SourceError,
    TopicSource,
};
use crate::ledger::UploadOutcome;
use crate::metadata::VideoMetadata;
use crate::retry::{RetryPolicy, with_retry};
use crate::runlog::LogLevel;
use crate::store::{Database, StoreError};
use crate::topic_source::DEFAULT_CATEGORIES;
use crate::topics::Topic;
use chrono::{Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Topics requested from the topic source per regeneration.
    pub batch_size: usize,
    /// Regenerate when fewer unused topics than this remain.
    pub low_water_mark: u64,
    pub categories: Vec<String>,
    pub log_retention_days: i64,
    pub source_retry: RetryPolicy,
    pub render_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
    /// Leave the rendered video on disk after publishing.
    pub keep_video: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            low_water_mark: 40,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            log_retention_days: 30,
            source_retry: RetryPolicy::new(2),
            render_retry: RetryPolicy::new(1),
            publish_retry: RetryPolicy::new(4),
            keep_video: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("lesson generation failed for topic {topic_id}: {source}")]
    Lesson {
        topic_id: i64,
        #[source]
        source: SourceError,
    },

    #[error("rendering failed for topic {topic_id}: {source}")]
    Render {
        topic_id: i64,
        #[source]
        source: RenderError,
    },

    #[error("publishing failed for topic {topic_id}: {source}")]
    Publish {
        topic_id: i64,
        #[source]
        source: PublishError,
    },

    #[error("topic {topic_id} already has a successful upload")]
    AlreadyPublished { topic_id: i64 },
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub topic: Topic,
    pub remote_id: String,
    pub topics_generated: usize,
}

/// Failure of a single publish attempt, as seen by the retry loop.
#[derive(Debug, Error)]
enum PublishStep {
    #[error(transparent)]
    Upload(PublishError),

    #[error("ledger write failed: {0}")]
    Ledger(StoreError),
}

impl Retryable for PublishStep {
    fn is_retryable(&self) -> bool {
        match self {
            PublishStep::Upload(e) => e.is_retryable(),
            PublishStep::Ledger(_) => false,
        }
    }
}

pub struct Orchestrator {
    db_path: PathBuf,
    config: PipelineConfig,
    topics: Box<dyn TopicSource>,
    lessons: Box<dyn LessonSource>,
    renderer: Box<dyn Renderer>,
    publisher: Box<dyn Publisher>,
}

impl Orchestrator {
    pub fn new(
        db_path: impl Into<PathBuf>,
        config: PipelineConfig,
        topics: Box<dyn TopicSource>,
        lessons: Box<dyn LessonSource>,
        renderer: Box<dyn Renderer>,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            config,
            topics,
            lessons,
            renderer,
            publisher,
        }
    }

    /// Runs the pipeline once against a freshly opened database.
    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let mut db = Database::open(&self.db_path)?;
        let result = self.run_with(&mut db).await;

        match &result {
            Ok(report) => note(
                &db,
                LogLevel::Info,
                &format!(
                    "Published topic {} as {}",
                    report.topic.id, report.remote_id
                ),
            ),
            Err(e) => note(&db, LogLevel::Error, &format!("Run failed: {e}")),
        }

        if let Err(e) = db.close() {
            warn!("Closing database failed: {}", e);
        }
        result
    }

    async fn run_with(&self, db: &mut Database) -> Result<RunReport, PipelineError> {
        self.prune_run_log(db);
        let topics_generated = self.ensure_topic_supply(db).await?;

        let topic = db.reserve_next(Utc::now())?;
        info!("Reserved topic {}: {} ({})", topic.id, topic.text, topic.category);
        note(
            db,
            LogLevel::Info,
            &format!("Reserved topic {}: {}", topic.id, topic.text),
        );

        let mut video = None;
        let published = self.produce_and_publish(db, &topic, &mut video).await;
        self.cleanup(video.as_deref());

        let remote_id = published?;
        Ok(RunReport {
            topic,
            remote_id,
            topics_generated,
        })
    }

    fn prune_run_log(&self, db: &Database) {
        let days = self.config.log_retention_days;
        let cutoff = Duration::try_days(days)
            .filter(|_| days >= 1)
            .and_then(|keep| Utc::now().checked_sub_signed(keep));
        let Some(cutoff) = cutoff else {
            warn!("Log retention of {} days is out of range; skipping prune", days);
            return;
        };
        match db.prune_logs(cutoff) {
            Ok(0) => {}
            Ok(n) => info!("Pruned {} run log entries", n),
            Err(e) => warn!("Pruning run log failed: {}", e),
        }
    }

    /// Tops up the unused topics when they fall below the low-water-mark.
    /// Generation failures are only logged; reservation decides whether the
    /// run can continue.
    async fn ensure_topic_supply(&self, db: &mut Database) -> Result<usize, PipelineError> {
        let unused = db.count_unused()?;
        if unused > 0 && unused >= self.config.low_water_mark {
            return Ok(0);
        }

        info!(
            "{} unused topics left (threshold {}); generating {} more",
            unused, self.config.low_water_mark, self.config.batch_size
        );
        let generated = with_retry(&self.config.source_retry, "topic generation", || {
            self.topics
                .generate(self.config.batch_size, &self.config.categories)
        })
        .await;

        match generated {
            Ok(candidates) => {
                let inserted = db.insert_batch(&candidates)?;
                info!(
                    "Inserted {} of {} generated topics",
                    inserted,
                    candidates.len()
                );
                note(
                    db,
                    LogLevel::Info,
                    &format!("Generated {inserted} new topics"),
                );
                Ok(inserted)
            }
            Err(e) => {
                error!("Topic generation failed: {}", e);
                note(db, LogLevel::Warn, &format!("Topic generation failed: {e}"));
                Ok(0)
            }
        }
    }

    async fn produce_and_publish(
        &self,
        db: &Database,
        topic: &Topic,
        video: &mut Option<PathBuf>,
    ) -> Result<String, PipelineError> {
        let topic_id = topic.id;

        let lesson = with_retry(&self.config.source_retry, "lesson generation", || {
            self.lessons.generate(topic)
        })
        .await
        .map_err(|source| PipelineError::Lesson { topic_id, source })?;
        info!("Lesson ready: {}", lesson.title);
        debug!("Narration preview: {:.200}", lesson.narration());

        let path = with_retry(&self.config.render_retry, "render", || {
            self.renderer.render(&lesson, topic)
        })
        .await
        .map_err(|source| PipelineError::Render { topic_id, source })?;
        *video = Some(path.clone());

        if db.has_successful_upload(topic_id)? {
            warn!("Topic {} was already published; skipping upload", topic_id);
            return Err(PipelineError::AlreadyPublished { topic_id });
        }

        let metadata = VideoMetadata::for_topic(topic, &lesson);
        let publisher = self.publisher.as_ref();
        let video_path = path.as_path();
        let meta = &metadata;

        let remote_id = with_retry(&self.config.publish_retry, "publish", move || {
            publish_attempt(publisher, db, topic_id, video_path, meta)
        })
        .await
        .map_err(|e| match e {
            PublishStep::Upload(source) => PipelineError::Publish { topic_id, source },
            PublishStep::Ledger(e) => PipelineError::Store(e),
        })?;

        Ok(remote_id)
    }

    fn cleanup(&self, video: Option<&Path>) {
        if let Err(e) = self.renderer.cleanup() {
            warn!("Removing render work files failed: {}", e);
        }
        if self.config.keep_video {
            return;
        }
        if let Some(video) = video.filter(|v| v.exists()) {
            match fs::remove_file(video) {
                Ok(()) => info!("Removed video {}", video.display()),
                Err(e) => warn!("Removing video {} failed: {}", video.display(), e),
            }
        }
    }
}

/// One upload. Every attempt lands in the ledger, failed ones included.
async fn publish_attempt(
    publisher: &dyn Publisher,
    db: &Database,
    topic_id: i64,
    video: &Path,
    metadata: &VideoMetadata,
) -> Result<String, PublishStep> {
    match publisher.publish(video, metadata).await {
        Ok(remote_id) => {
            let outcome = UploadOutcome::success(remote_id.clone());
            if let Err(e) = db.record(topic_id, &outcome, Utc::now()) {
                error!("Video {} uploaded but not recorded: {}", remote_id, e);
                return Err(PublishStep::Ledger(e));
            }
            Ok(remote_id)
        }
        Err(e) => {
            let outcome = UploadOutcome::failure(e.to_string());
            db.record(topic_id, &outcome, Utc::now())
                .map_err(PublishStep::Ledger)?;
            Err(PublishStep::Upload(e))
        }
    }
}

/// Writes a run log entry; failures only warn.
fn note(db: &Database, level: LogLevel, message: &str) {
    if let Err(e) = db.log_event(level, message, Utc::now()) {
        warn!("Could not write run log entry: {}", e);
    }
}
