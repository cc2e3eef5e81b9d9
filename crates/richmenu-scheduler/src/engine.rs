use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{Result, SchedulerError};
use crate::pipeline::{PublishReport, Publisher, Trigger};
use crate::schedule::{select_due, Moment};
use crate::store::JobStore;
use crate::types::ScheduledJob;

/// Counts from one pass of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run one job on its own task so a panic inside the pipeline surfaces as an
/// error instead of unwinding through the caller.
async fn run_isolated(
    publisher: &Arc<Publisher>,
    job: ScheduledJob,
    trigger: Trigger,
    now: DateTime<Tz>,
) -> Result<PublishReport> {
    let job_id = job.id;
    let publisher = Arc::clone(publisher);
    tokio::spawn(async move { publisher.run(&job, trigger, now).await })
        .await
        .map_err(|e| {
            error!(job_id, "publishing task aborted: {e}");
            SchedulerError::Unexpected(format!("publishing task aborted: {e}"))
        })?
}

/// Shared handle for the manual trigger while the engine loop runs.
#[derive(Clone)]
pub struct SchedulerHandle {
    publisher: Arc<Publisher>,
    tz: Tz,
}

impl SchedulerHandle {
    pub fn store(&self) -> &Arc<dyn JobStore> {
        self.publisher.store()
    }

    /// Run `job_id` immediately, ignoring its window, time, recurrence and
    /// enabled flag. The outcome is recorded exactly as for a polled run.
    pub async fn run_now(&self, job_id: i64) -> Result<PublishReport> {
        let job = self
            .publisher
            .store()
            .get(job_id)?
            .ok_or(SchedulerError::NotFound {
                what: "job",
                id: job_id,
            })?;
        info!(job_id, "manual trigger");
        let now = Utc::now().with_timezone(&self.tz);
        run_isolated(&self.publisher, job, Trigger::Manual, now).await
    }
}

/// Polls for due jobs and publishes them, one at a time.
pub struct SchedulerEngine {
    publisher: Arc<Publisher>,
    tz: Tz,
    poll_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(publisher: Publisher, tz: Tz, poll_interval: Duration) -> Self {
        Self {
            publisher: Arc::new(publisher),
            tz,
            poll_interval,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            publisher: Arc::clone(&self.publisher),
            tz: self.tz,
        }
    }

    /// Main event loop. Checks once per `poll_interval` until `shutdown`
    /// broadcasts `true`. A check in progress is finished before exiting.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tz = %self.tz,
            interval_secs = self.poll_interval.as_secs(),
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now().with_timezone(&self.tz);
                    if let Err(e) = self.check_at(now).await {
                        error!("scheduler check error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Select the jobs due at `now` and run them sequentially.
    ///
    /// Only a failed selection is returned as an error; individual job
    /// failures are recorded on the job and counted.
    pub async fn check_at(&self, now: DateTime<Tz>) -> Result<CheckSummary> {
        let moment = Moment::at(now);
        let due = select_due(self.publisher.store().as_ref(), &moment)?;

        let mut summary = CheckSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!(at = %moment.time_of_day, "no jobs due");
            return Ok(summary);
        }
        info!(count = due.len(), at = %moment.time_of_day, "due jobs found");

        for job in due {
            let job_id = job.id;
            match run_isolated(&self.publisher, job, Trigger::Scheduled, moment.now).await {
                Ok(report) => {
                    summary.succeeded += 1;
                    info!(job_id, menus = report.uploaded.len(), "job published");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(job_id, code = e.code(), "job failed: {e}");
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ImageEncoder;
    use crate::store::SqliteJobStore;
    use crate::testutil::{daily_job, store_with_project, write_png, Fixture, RecordingClient};
    use crate::types::RunStatus;
    use chrono::TimeZone;
    use chrono_tz::Asia::Taipei;
    use tempfile::TempDir;

    fn engine(
        menus: &[&str],
        client: RecordingClient,
    ) -> (SchedulerEngine, Arc<SqliteJobStore>, Fixture, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for name in menus {
            write_png(dir.path(), &format!("{name}.png"));
        }
        let (store, fx) = store_with_project(menus);
        let store = Arc::new(store);
        let publisher = Publisher::new(
            store.clone(),
            Arc::new(client),
            ImageEncoder::default(),
            dir.path(),
        );
        let engine = SchedulerEngine::new(publisher, Taipei, Duration::from_secs(60));
        (engine, store, fx, dir)
    }

    fn at(hh: u32, mm: u32) -> DateTime<Tz> {
        Taipei.with_ymd_and_hms(2026, 10, 17, hh, mm, 0).unwrap()
    }

    #[tokio::test]
    async fn due_job_runs_once_per_day() {
        let (engine, store, fx, _dir) = engine(&["Main"], RecordingClient::default());
        let job = store
            .create_job(&daily_job(fx.project_id, "2026-10-01", "2026-10-31", "09:30"))
            .unwrap();

        let first = engine.check_at(at(9, 30)).await.unwrap();
        assert_eq!(first, CheckSummary { due: 1, succeeded: 1, failed: 0 });

        // a second check inside the same minute finds nothing to do
        let second = engine.check_at(at(9, 30)).await.unwrap();
        assert_eq!(second, CheckSummary::default());

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.last_run_status, Some(RunStatus::Success));
    }

    #[tokio::test]
    async fn nothing_due_outside_run_time() {
        let (engine, store, fx, _dir) = engine(&["Main"], RecordingClient::default());
        store
            .create_job(&daily_job(fx.project_id, "2026-10-01", "2026-10-31", "09:30"))
            .unwrap();

        assert_eq!(engine.check_at(at(9, 29)).await.unwrap().due, 0);
    }

    #[tokio::test]
    async fn failed_job_is_recorded_and_later_jobs_still_run() {
        let (engine, store, fx, _dir) = engine(&["Main"], RecordingClient::default());
        let mut broken = daily_job(fx.project_id, "2026-10-01", "2026-10-31", "09:30");
        broken.scope = crate::types::Scope::Single;
        broken.current_tab_index = 5;
        let broken = store.create_job(&broken).unwrap();
        let healthy = store
            .create_job(&daily_job(fx.project_id, "2026-10-01", "2026-10-31", "09:30"))
            .unwrap();

        let summary = engine.check_at(at(9, 30)).await.unwrap();
        assert_eq!(summary, CheckSummary { due: 2, succeeded: 1, failed: 1 });

        let broken = store.get(broken.id).unwrap().unwrap();
        assert_eq!(broken.last_run_status, Some(RunStatus::Error));
        assert!(broken.last_run_message.unwrap().contains("out of range"));
        let healthy = store.get(healthy.id).unwrap().unwrap();
        assert_eq!(healthy.last_run_status, Some(RunStatus::Success));
    }

    #[tokio::test]
    async fn run_now_ignores_schedule_and_records_manual_message() {
        let (engine, store, fx, _dir) = engine(&["Main"], RecordingClient::default());
        // window already over
        let job = store
            .create_job(&daily_job(fx.project_id, "2020-01-01", "2020-01-31", "03:00"))
            .unwrap();

        engine.handle().run_now(job.id).await.unwrap();

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.last_run_status, Some(RunStatus::Success));
        assert_eq!(
            stored.last_run_message.as_deref(),
            Some(crate::pipeline::MANUAL_SUCCESS_MESSAGE)
        );
    }

    #[tokio::test]
    async fn run_now_unknown_job_is_not_found() {
        let (engine, _store, _fx, _dir) = engine(&["Main"], RecordingClient::default());
        let err = engine.handle().run_now(404).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { what: "job", id: 404 }));
    }

    #[tokio::test]
    async fn run_now_failure_is_returned_and_recorded() {
        let (engine, store, fx, _dir) = engine(
            &["Main"],
            RecordingClient {
                fail_create: true,
                ..Default::default()
            },
        );
        let job = store
            .create_job(&daily_job(fx.project_id, "2026-10-01", "2026-10-31", "09:30"))
            .unwrap();

        let err = engine.handle().run_now(job.id).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_REJECTED");
        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.last_run_status, Some(RunStatus::Error));
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let (engine, _store, _fx, _dir) = engine(&[], RecordingClient::default());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("engine did not stop")
            .unwrap();
    }
}
