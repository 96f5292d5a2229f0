//! Resumable uploads to the YouTube Data API.
//!
//! Authorization is done out of band; this client only reads an access token
//! from a JSON token file and fails with an auth error when it is missing or
//! expired.

use crate::interface::{PublishError, Publisher};
use crate::metadata::VideoMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const QUOTA_REASONS: [&str; 3] = ["quotaExceeded", "uploadLimitExceeded", "dailyLimitExceeded"];

#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

pub struct YouTubePublisher {
    client: reqwest::Client,
    token_path: PathBuf,
}

impl YouTubePublisher {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();
        Self {
            client,
            token_path: token_path.into(),
        }
    }

    fn access_token(&self) -> Result<String, PublishError> {
        let raw = std::fs::read_to_string(&self.token_path).map_err(|e| {
            PublishError::Auth(format!(
                "cannot read token file {}: {e}",
                self.token_path.display()
            ))
        })?;
        parse_token(&raw, Utc::now())
    }

    async fn start_session(
        &self,
        token: &str,
        metadata: &VideoMetadata,
        size: usize,
    ) -> Result<String, PublishError> {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id,
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": metadata.made_for_kids,
            }
        });

        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Transient(format!("upload session request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Transient("upload session had no location".to_string()))
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    #[instrument(skip(self, metadata), fields(title = %metadata.title))]
    async fn publish(
        &self,
        video: &Path,
        metadata: &VideoMetadata,
    ) -> Result<String, PublishError> {
        let token = self.access_token()?;
        let bytes = tokio::fs::read(video).await.map_err(|e| {
            PublishError::Rejected(format!("cannot read video {}: {e}", video.display()))
        })?;

        info!("Uploading video: {} ({} bytes)", metadata.title, bytes.len());
        let session = self.start_session(&token, metadata, bytes.len()).await?;
        debug!("Upload session opened");

        let response = self
            .client
            .put(&session)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::Transient(format!("upload transfer failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let uploaded: UploadedVideo = response
            .json()
            .await
            .map_err(|e| PublishError::Transient(format!("unreadable upload response: {e}")))?;
        info!("Video uploaded: https://www.youtube.com/shorts/{}", uploaded.id);
        Ok(uploaded.id)
    }
}

fn parse_token(raw: &str, now: DateTime<Utc>) -> Result<String, PublishError> {
    let token: StoredToken = serde_json::from_str(raw)
        .map_err(|e| PublishError::Auth(format!("invalid token file: {e}")))?;
    if token.access_token.trim().is_empty() {
        return Err(PublishError::Auth("token file has no access token".to_string()));
    }
    if let Some(expires_at) = token.expires_at {
        if expires_at <= now {
            return Err(PublishError::Auth(format!(
                "access token expired at {expires_at}; re-authorize"
            )));
        }
    }
    Ok(token.access_token)
}

fn classify_failure(status: StatusCode, body: &str) -> PublishError {
    let detail = format!("{status}: {}", body.chars().take(300).collect::<String>());
    if QUOTA_REASONS.iter().any(|reason| body.contains(reason)) {
        return PublishError::Quota(detail);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            PublishError::Transient(detail)
        }
        s if s.is_server_error() => PublishError::Transient(detail),
        _ => PublishError::Rejected(detail),
    }
}
