use std::{str::FromStr, sync::Arc, time::Duration};

use time::{Duration as TimeDuration, OffsetDateTime};

use crate::{
    core::service::EventService,
    error::{ErrorKind, QueryResult, UpstreamContext},
};

/// How often the ticketing source is checked for events that ended
const CHECK_INTERVAL: TimeDuration = TimeDuration::days(1);

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum JobKind {
    Reminder,
    Results,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Reminder => "reminder",
            JobKind::Results => "results",
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(JobKind::Reminder),
            "results" => Ok(JobKind::Results),
            _ => Err(anyhow::anyhow!("Unknown job kind '{}'", s)),
        }
    }
}

/// A dispatch stored until it is due. At most one job exists per key.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Job {
    pub key: String,
    pub kind: JobKind,
    pub event_id: String,
    pub due_at: OffsetDateTime,
}

impl Job {
    pub fn new(kind: JobKind, event_id: &str, due_at: OffsetDateTime) -> Self {
        Job {
            key: format!("{}:{}", kind.as_str(), event_id),
            kind,
            event_id: event_id.to_owned(),
            due_at,
        }
    }
}

/// Enqueue the dispatches of every event that ended since the last successful check.
///
/// A fresh store starts one day back. The window start is stored before the ticketing
/// source is queried, so a failed check is retried over the same window.
/// Returns the number of jobs that were not known yet.
pub async fn enqueue_ended_events(service: &EventService, now: OffsetDateTime) -> QueryResult<usize> {
    let db = service.db();
    let since = match db
        .get_checked_until()
        .await
        .upstream("Error reading scheduler state.")?
    {
        Some(since) => since,
        None => {
            let since = now - CHECK_INTERVAL;
            db.set_checked_until(since)
                .await
                .upstream("Error saving scheduler state.")?;
            since
        }
    };

    let events = service.all_events().await?;
    let mut added = 0;

    for event in events.iter().filter(|e| e.ended_between(since, now)) {
        let mut jobs = vec![];
        if event.reminder_due_at() > now {
            jobs.push(Job::new(JobKind::Reminder, &event.id, event.reminder_due_at()));
        }
        jobs.push(Job::new(JobKind::Results, &event.id, event.results_due_at()));

        for job in jobs {
            if db.schedule_job(&job).await.upstream("Error scheduling job.")? {
                log::info!("Scheduled {} at {}", job.key, job.due_at);
                added += 1;
            }
        }
    }

    db.set_checked_until(now)
        .await
        .upstream("Error saving scheduler state.")?;
    Ok(added)
}

/// Whether the last successful check is a day old, or there never was one.
pub async fn check_is_due(service: &EventService, now: OffsetDateTime) -> QueryResult<bool> {
    let checked_until = service
        .db()
        .get_checked_until()
        .await
        .upstream("Error reading scheduler state.")?;
    Ok(checked_until.map_or(true, |at| now - at >= CHECK_INTERVAL))
}

/// Run every job due at `now`. Jobs failing on an upstream error stay queued.
pub async fn run_due_jobs(service: &EventService, now: OffsetDateTime) -> QueryResult<usize> {
    let jobs = service
        .db()
        .get_due_jobs(now)
        .await
        .upstream("Error fetching due jobs.")?;
    let mut completed = 0;

    for job in jobs {
        log::info!("Running job {}", job.key);
        let result = match job.kind {
            JobKind::Reminder => service.send_reminders(&job.event_id).await,
            JobKind::Results => service.send_results_for(&job.event_id).await,
        };

        match result {
            Ok(report) => log::info!(
                "Job {} done, {} sent, {} failed",
                job.key,
                report.sent,
                report.failed
            ),
            Err(e) if e.kind == ErrorKind::Upstream => {
                log::warn!("Job {} will be retried: {}", job.key, e);
                continue;
            }
            Err(e) => log::error!("Job {} failed: {}", job.key, e),
        }

        service
            .db()
            .complete_job(&job.key, now)
            .await
            .upstream("Error completing job.")?;
        completed += 1;
    }

    Ok(completed)
}

/// Every `poll`, check for ended events when a check is due and run due jobs.
pub async fn run_scheduler(service: Arc<EventService>, poll: Duration) -> anyhow::Result<()> {
    let mut poller = tokio::time::interval(poll);
    log::info!("Scheduler started, polling every {}s", poll.as_secs());

    loop {
        poller.tick().await;
        let now = OffsetDateTime::now_utc();

        match check_is_due(&service, now).await {
            Ok(true) => {
                if let Err(e) = enqueue_ended_events(&service, now).await {
                    log::error!("Event check failed, retrying on next poll: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => log::error!("Event check failed: {}", e),
        }

        if let Err(e) = run_due_jobs(&service, now).await {
            log::error!("Running due jobs failed: {}", e);
        }
    }
}
