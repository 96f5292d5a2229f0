//! Run loops for the scheduled and continuous modes.

use crate::pipeline::Orchestrator;
use chrono::{DateTime, Local, TimeZone};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

static POST_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid post time regex"));

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid post time {0:?}, expected HH:MM")]
    InvalidPostTime(String),

    #[error("no post times given")]
    Empty,

    #[error("invalid cron expression: {0}")]
    Cron(#[from] cron::error::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PostTime {
    pub hour: u32,
    pub minute: u32,
}

/// Parses a comma separated list such as `08:00,20:00`. Sorted, deduplicated.
pub fn parse_post_times(raw: &str) -> Result<Vec<PostTime>, ScheduleError> {
    let mut times = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let caps = POST_TIME_RE
            .captures(part)
            .ok_or_else(|| ScheduleError::InvalidPostTime(part.to_string()))?;
        let hour: u32 = caps[1]
            .parse()
            .map_err(|_| ScheduleError::InvalidPostTime(part.to_string()))?;
        let minute: u32 = caps[2]
            .parse()
            .map_err(|_| ScheduleError::InvalidPostTime(part.to_string()))?;
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidPostTime(part.to_string()));
        }
        times.push(PostTime { hour, minute });
    }
    if times.is_empty() {
        return Err(ScheduleError::Empty);
    }
    times.sort();
    times.dedup();
    Ok(times)
}

/// Fires once a day at each post time.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    times: Vec<PostTime>,
    schedules: Vec<cron::Schedule>,
}

impl DailySchedule {
    pub fn new(times: &[PostTime]) -> Result<Self, ScheduleError> {
        if times.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let schedules = times
            .iter()
            .map(|t| cron::Schedule::from_str(&format!("0 {} {} * * * *", t.minute, t.hour)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            times: times.to_vec(),
            schedules,
        })
    }

    pub fn times(&self) -> &[PostTime] {
        &self.times
    }

    /// Earliest fire time strictly after `after`, in the same time zone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(after).next())
            .min()
    }
}

/// Runs at every post time (local clock) until Ctrl-C.
pub async fn run_scheduled(orchestrator: &Orchestrator, schedule: &DailySchedule) {
    info!("Scheduled mode: posting at {:?}", schedule.times());
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            warn!("Schedule has no upcoming post time; stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            "Next run at {} (in {} min)",
            next.format("%Y-%m-%d %H:%M"),
            wait.as_secs() / 60
        );
        if !sleep_or_shutdown(wait).await {
            return;
        }
        run_logged(orchestrator).await;
    }
}

/// Runs immediately, then every `interval` until Ctrl-C.
pub async fn run_continuous(orchestrator: &Orchestrator, interval: Duration) {
    info!("Continuous mode: one run every {} min", interval.as_secs() / 60);
    loop {
        run_logged(orchestrator).await;
        info!("Sleeping {} min until the next run", interval.as_secs() / 60);
        if !sleep_or_shutdown(interval).await {
            return;
        }
    }
}

/// Returns false when Ctrl-C arrived first. A run in progress is not
/// interrupted.
async fn sleep_or_shutdown(wait: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, stopping loop");
            false
        }
    }
}

async fn run_logged(orchestrator: &Orchestrator) {
    match orchestrator.run_once().await {
        Ok(report) => info!(
            "Run complete: topic {} published as {}",
            report.topic.id, report.remote_id
        ),
        Err(e) => error!("Run failed, waiting for the next slot: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parses_sorted_unique_post_times() {
        let times = parse_post_times(" 20:00, 8:05,20:00 ").unwrap();
        assert_eq!(
            times,
            vec![
                PostTime { hour: 8, minute: 5 },
                PostTime {
                    hour: 20,
                    minute: 0
                },
            ]
        );
    }

    #[test]
    fn rejects_bad_post_times() {
        for raw in ["24:00", "08:60", "8", "aa:bb", "08:00:00"] {
            assert!(
                matches!(parse_post_times(raw), Err(ScheduleError::InvalidPostTime(_))),
                "{raw} should be rejected"
            );
        }
        assert!(matches!(parse_post_times(" , "), Err(ScheduleError::Empty)));
    }

    #[test]
    fn next_post_time_is_the_nearest_slot() {
        let schedule = DailySchedule::new(&parse_post_times("08:00,20:00").unwrap()).unwrap();

        let morning = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(&morning),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap())
        );

        let on_slot = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(&on_slot),
            Some(Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap())
        );

        let early = Utc.with_ymd_and_hms(2025, 3, 1, 0, 1, 0).unwrap();
        assert_eq!(
            schedule.next_after(&early),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap())
        );
    }
}
