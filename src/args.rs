use anyhow::bail;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One pipeline run, then exit.
    Once,
    /// Run at each daily post time.
    Scheduled,
    /// Run every `--interval` hours.
    Continuous,
    /// Print topic counts, recent uploads and the run log.
    Status,
    /// Insert the built-in sample topics.
    Seed,
    /// Mark `--topic-id` as used without publishing it.
    Retire,
}

#[derive(Parser, Debug)]
#[clap(about = "Generates narrated lesson shorts and uploads them to YouTube")]
pub struct Args {
    #[clap(long, value_enum, default_value_t = Mode::Once)]
    pub mode: Mode,

    /// Hours between runs in continuous mode.
    #[clap(long, default_value_t = 12)]
    pub interval: u64,

    /// Local post times for scheduled mode, e.g. "08:00,20:00". Overrides POST_TIMES.
    #[clap(long)]
    pub post_times: Option<String>,

    #[clap(long, default_value = "app_data.db")]
    pub db: PathBuf,

    #[clap(long, default_value = "temp_assets")]
    pub work_dir: PathBuf,

    /// Overrides PIPER_MODEL.
    #[clap(long)]
    pub piper_model: Option<PathBuf>,

    /// Topic for retire mode.
    #[clap(long)]
    pub topic_id: Option<i64>,

    /// Rows listed per section in status mode.
    #[clap(long, default_value_t = 10)]
    pub limit: usize,

    #[clap(long)]
    pub keep_video: bool,
}

impl Args {
    /// The continuous-mode period. Zero or overflowing hour counts are rejected.
    pub fn interval_duration(&self) -> anyhow::Result<Duration> {
        if self.interval == 0 {
            bail!("--interval must be at least 1 hour");
        }
        match self.interval.checked_mul(3600) {
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => bail!("--interval of {} hours is too large", self.interval),
        }
    }
}
