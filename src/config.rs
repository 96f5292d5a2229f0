//! Settings read from the environment (after `.env` is loaded).

use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LESSON_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_LONGCAT_BASE_URL: &str = "https://api.longcat.chat/openai";
const DEFAULT_TOPIC_MODEL: &str = "LongCat-Flash-Chat";
/// Upper bound for LOG_RETENTION_DAYS, ten years.
const MAX_LOG_RETENTION_DAYS: i64 = 3650;

/// Credentials and model for one OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub lesson_endpoint: ChatEndpoint,
    pub topic_endpoint: ChatEndpoint,
    pub piper_model: PathBuf,
    pub youtube_token_file: PathBuf,
    pub topic_batch_size: usize,
    pub min_unused_topics: u64,
    pub post_times: String,
    pub log_retention_days: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let lesson_endpoint = ChatEndpoint {
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            model: get("LESSON_MODEL").unwrap_or_else(|| DEFAULT_LESSON_MODEL.to_string()),
        };

        // Topics go to LongCat when a key is present, otherwise to the lesson endpoint.
        let topic_endpoint = match get("LONGCAT_API_KEY") {
            Some(api_key) => ChatEndpoint {
                base_url: get("LONGCAT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LONGCAT_BASE_URL.to_string()),
                api_key,
                model: get("TOPIC_MODEL").unwrap_or_else(|| DEFAULT_TOPIC_MODEL.to_string()),
            },
            None => ChatEndpoint {
                model: get("TOPIC_MODEL").unwrap_or_else(|| lesson_endpoint.model.clone()),
                ..lesson_endpoint.clone()
            },
        };

        let topic_batch_size: usize =
            parse_or(get("TOPIC_BATCH_SIZE"), "TOPIC_BATCH_SIZE", 200)?;
        if topic_batch_size == 0 {
            bail!("TOPIC_BATCH_SIZE must be at least 1");
        }
        let min_unused_topics = parse_or(
            get("MIN_UNUSED_TOPICS"),
            "MIN_UNUSED_TOPICS",
            (topic_batch_size / 5).max(1) as u64,
        )?;
        let log_retention_days: i64 =
            parse_or(get("LOG_RETENTION_DAYS"), "LOG_RETENTION_DAYS", 30)?;
        if !(1..=MAX_LOG_RETENTION_DAYS).contains(&log_retention_days) {
            bail!(
                "LOG_RETENTION_DAYS must be between 1 and {}, got {}",
                MAX_LOG_RETENTION_DAYS,
                log_retention_days
            );
        }

        Ok(Self {
            lesson_endpoint,
            topic_endpoint,
            piper_model: get("PIPER_MODEL")
                .unwrap_or_else(|| "./tts/en_US-hfc_male-medium.onnx".to_string())
                .into(),
            youtube_token_file: get("YOUTUBE_TOKEN_FILE")
                .unwrap_or_else(|| "youtube_token.json".to_string())
                .into(),
            topic_batch_size,
            min_unused_topics,
            post_times: get("POST_TIMES").unwrap_or_else(|| "08:00,20:00".to_string()),
            log_retention_days,
        })
    }

    /// Fails when the AI endpoints cannot be called at all.
    pub fn require_api_keys(&self) -> Result<()> {
        if self.lesson_endpoint.api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }
        if self.topic_endpoint.api_key.is_empty() {
            bail!("no API key for topic generation (set LONGCAT_API_KEY or OPENAI_API_KEY)");
        }
        Ok(())
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(s.lesson_endpoint.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(s.lesson_endpoint.model, DEFAULT_LESSON_MODEL);
        assert_eq!(s.topic_endpoint, s.lesson_endpoint);
        assert_eq!(s.topic_batch_size, 200);
        assert_eq!(s.min_unused_topics, 40);
        assert_eq!(s.post_times, "08:00,20:00");
        assert_eq!(s.log_retention_days, 30);
        s.require_api_keys().unwrap();
    }

    #[test]
    fn longcat_key_selects_topic_endpoint() {
        let s =
            settings(&[("OPENAI_API_KEY", "sk-test"), ("LONGCAT_API_KEY", "lc-test")]).unwrap();
        assert_eq!(s.topic_endpoint.base_url, DEFAULT_LONGCAT_BASE_URL);
        assert_eq!(s.topic_endpoint.api_key, "lc-test");
        assert_eq!(s.topic_endpoint.model, DEFAULT_TOPIC_MODEL);
    }

    #[test]
    fn low_water_mark_follows_batch_size() {
        let s = settings(&[("TOPIC_BATCH_SIZE", "50")]).unwrap();
        assert_eq!(s.min_unused_topics, 10);
        let s = settings(&[("TOPIC_BATCH_SIZE", "50"), ("MIN_UNUSED_TOPICS", "3")]).unwrap();
        assert_eq!(s.min_unused_topics, 3);
    }

    #[test]
    fn invalid_numbers_and_missing_keys_are_reported() {
        assert!(settings(&[("TOPIC_BATCH_SIZE", "lots")]).is_err());
        assert!(settings(&[("TOPIC_BATCH_SIZE", "0")]).is_err());
        let s = settings(&[]).unwrap();
        assert!(s.require_api_keys().is_err());
    }

    #[test]
    fn log_retention_must_be_a_sane_number_of_days() {
        assert!(settings(&[("LOG_RETENTION_DAYS", "-5")]).is_err());
        assert!(settings(&[("LOG_RETENTION_DAYS", "0")]).is_err());
        assert!(settings(&[("LOG_RETENTION_DAYS", "100000000")]).is_err());
        let s = settings(&[("LOG_RETENTION_DAYS", "7")]).unwrap();
        assert_eq!(s.log_retention_days, 7);
    }
}
