mod args;
mod audio;
mod config;
mod interface;
mod ledger;
mod lesson;
mod llm;
mod metadata;
mod pipeline;
mod render;
mod retry;
mod runlog;
mod schedule;
mod store;
mod subtitle;
mod topic_source;
mod topics;
mod tts;
mod utils;
mod youtube;

use anyhow::{Context, bail};
use args::{Args, Mode};
use clap::Parser;
use chrono::Utc;
use config::Settings;
use ledger::UploadOutcome;
use lesson::AiLessonSource;
use llm::ChatClient;
use pipeline::{Orchestrator, PipelineConfig};
use render::SlideRenderer;
use runlog::LogLevel;
use schedule::{DailySchedule, parse_post_times};
use std::path::Path;
use store::Database;
use topic_source::{AiTopicSource, sample_topics};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use youtube::YouTubePublisher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.mode {
        Mode::Status => show_status(&args.db, args.limit),
        Mode::Seed => seed(&args.db),
        Mode::Retire => {
            let Some(topic_id) = args.topic_id else {
                bail!("--topic-id is required in retire mode");
            };
            retire(&args.db, topic_id)
        }
        Mode::Once => {
            let settings = Settings::from_env()?;
            let orchestrator = build_orchestrator(&args, &settings)?;
            info!("Starting lesson video pipeline");
            match orchestrator.run_once().await {
                Ok(report) => {
                    info!(
                        "Published topic {} ({}) as {}; {} new topics generated",
                        report.topic.id,
                        report.topic.text,
                        report.remote_id,
                        report.topics_generated
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("Pipeline run failed: {}", e);
                    Err(e).context("pipeline run failed")
                }
            }
        }
        Mode::Scheduled => {
            let settings = Settings::from_env()?;
            let raw_times = args.post_times.as_deref().unwrap_or(&settings.post_times);
            let schedule = DailySchedule::new(&parse_post_times(raw_times)?)?;
            let orchestrator = build_orchestrator(&args, &settings)?;
            schedule::run_scheduled(&orchestrator, &schedule).await;
            Ok(())
        }
        Mode::Continuous => {
            let interval = args.interval_duration()?;
            let settings = Settings::from_env()?;
            let orchestrator = build_orchestrator(&args, &settings)?;
            schedule::run_continuous(&orchestrator, interval).await;
            Ok(())
        }
    }
}

fn build_orchestrator(args: &Args, settings: &Settings) -> anyhow::Result<Orchestrator> {
    settings.require_api_keys()?;

    let piper_model = args
        .piper_model
        .clone()
        .unwrap_or_else(|| settings.piper_model.clone());
    if !piper_model.exists() {
        warn!("Piper model not found: {}", piper_model.display());
    }
    if !settings.youtube_token_file.exists() {
        warn!(
            "YouTube token file not found: {}",
            settings.youtube_token_file.display()
        );
    }

    let topics = &settings.topic_endpoint;
    let lessons = &settings.lesson_endpoint;
    info!(
        "Topic model: {}, lesson model: {}",
        topics.model, lessons.model
    );

    let config = PipelineConfig {
        batch_size: settings.topic_batch_size,
        low_water_mark: settings.min_unused_topics,
        log_retention_days: settings.log_retention_days,
        keep_video: args.keep_video,
        ..PipelineConfig::default()
    };

    Ok(Orchestrator::new(
        &args.db,
        config,
        Box::new(AiTopicSource::new(ChatClient::new(
            &topics.base_url,
            &topics.api_key,
            &topics.model,
        ))),
        Box::new(AiLessonSource::new(ChatClient::new(
            &lessons.base_url,
            &lessons.api_key,
            &lessons.model,
        ))),
        Box::new(SlideRenderer::new(piper_model, &args.work_dir)),
        Box::new(YouTubePublisher::new(&settings.youtube_token_file)),
    ))
}

fn show_status(db_path: &Path, limit: usize) -> anyhow::Result<()> {
    let db = Database::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    println!(
        "Topics: {} unused / {} total",
        db.count_unused()?,
        db.count_total()?
    );

    println!("\nRecent uploads:");
    for record in db.recent(limit)? {
        let topic = db
            .topic(record.topic_id)?
            .map(|t| t.text)
            .unwrap_or_default();
        let when = record.created_at.format("%Y-%m-%d %H:%M");
        match &record.outcome {
            UploadOutcome::Success { remote_id } => {
                println!(
                    "  [{}] {when}  #{} {topic}: https://youtu.be/{remote_id}",
                    record.id, record.topic_id
                )
            }
            UploadOutcome::Failure { error } => {
                println!(
                    "  [{}] {when}  #{} {topic}: FAILED {error}",
                    record.id, record.topic_id
                )
            }
        }
    }

    println!("\nRun log:");
    for entry in db.recent_logs(limit)? {
        println!(
            "  [{}] {}  {:<5} {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.message
        );
    }

    db.close()?;
    Ok(())
}

fn seed(db_path: &Path) -> anyhow::Result<()> {
    let mut db = Database::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let samples = sample_topics();
    let inserted = db.insert_batch(&samples)?;
    info!(
        "Seeded {} of {} sample topics ({} unused now)",
        inserted,
        samples.len(),
        db.count_unused()?
    );
    db.close()?;
    Ok(())
}

fn retire(db_path: &Path, topic_id: i64) -> anyhow::Result<()> {
    let db = Database::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.mark_used_at(topic_id, Utc::now())?;
    db.log_event(
        LogLevel::Warn,
        &format!("Topic {topic_id} retired by operator"),
        Utc::now(),
    )?;
    if let Some(topic) = db.topic(topic_id)? {
        info!(
            "Topic {} \"{}\" is {} since {}",
            topic.id,
            topic.text,
            topic.status.as_str(),
            topic.used_at.unwrap_or(topic.created_at)
        );
    }
    db.close()?;
    Ok(())
}
