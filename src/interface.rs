//! Seams between the pipeline and the services it drives.
//!
//! The orchestrator only talks to these traits; the concrete AI, rendering and
//! upload clients live in their own modules and tests substitute fakes.

use crate::lesson::Lesson;
use crate::metadata::VideoMetadata;
use crate::topics::{NewTopic, Topic};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Whether repeating the same call may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        // A fresh completion usually parses even when the last one did not.
        !matches!(self, SourceError::Rejected(_))
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering resource unavailable: {0}")]
    Resource(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl Retryable for RenderError {
    fn is_retryable(&self) -> bool {
        matches!(self, RenderError::Resource(_))
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upload quota exhausted: {0}")]
    Quota(String),

    #[error("transient upload failure: {0}")]
    Transient(String),

    #[error("upload rejected: {0}")]
    Rejected(String),
}

impl Retryable for PublishError {
    fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn generate(
        &self,
        count: usize,
        categories: &[String],
    ) -> Result<Vec<NewTopic>, SourceError>;
}

#[async_trait]
pub trait LessonSource: Send + Sync {
    async fn generate(&self, topic: &Topic) -> Result<Lesson, SourceError>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Produces a finished video and returns its path.
    async fn render(&self, lesson: &Lesson, topic: &Topic) -> Result<PathBuf, RenderError>;

    /// Removes intermediate files left by earlier renders.
    fn cleanup(&self) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads the video and returns the platform's id for it.
    async fn publish(&self, video: &Path, metadata: &VideoMetadata)
    -> Result<String, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_publish_errors_retry() {
        assert!(PublishError::Transient("503".into()).is_retryable());
        assert!(!PublishError::Quota("daily limit".into()).is_retryable());
        assert!(!PublishError::Auth("expired".into()).is_retryable());
        assert!(!PublishError::Rejected("bad title".into()).is_retryable());
    }

    #[test]
    fn render_and_source_retry_classes() {
        assert!(RenderError::Resource("ffmpeg missing".into()).is_retryable());
        assert!(!RenderError::Encoding("exit 1".into()).is_retryable());
        assert!(SourceError::Transient("timeout".into()).is_retryable());
        assert!(SourceError::Malformed("not json".into()).is_retryable());
        assert!(!SourceError::Rejected("401".into()).is_retryable());
    }
}
