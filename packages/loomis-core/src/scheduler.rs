//! Cron-driven task scheduler.
//!
//! One worker loop dispatches every registered task at its wall-clock fire
//! times. A single job runs at a time: the upstream APIs the task bodies
//! talk to dislike parallel writes, and the bodies are seconds-to-minutes
//! long. Shutdown wakes the worker immediately; an in-flight job is
//! signaled through its cancellation token and always runs to completion
//! before `shutdown` returns.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use cron::Schedule;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::LoomisResult;

/// A unit of scheduled work.
///
/// Implementors must tolerate being invoked again on a later cycle after a
/// failure; the scheduler never retries out-of-band.
#[async_trait]
pub trait CronJob: Send + Sync {
    /// Runs one cycle. `shutdown` is signaled when the daemon is stopping;
    /// long pacing sleeps should observe it and return early.
    async fn run(&self, shutdown: &CancellationToken) -> LoomisResult<()>;
}

/// A named task with a six-field cron expression (seconds first).
pub struct Task {
    pub name: String,
    pub cron: String,
    pub job: Arc<dyn CronJob>,
}

impl Task {
    pub fn new(name: impl Into<String>, cron: impl Into<String>, job: Arc<dyn CronJob>) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
            job,
        }
    }
}

struct ScheduledTask {
    name: String,
    cron: String,
    schedule: Schedule,
    job: Arc<dyn CronJob>,
    next_fire: Option<DateTime<Local>>,
}

/// Single-worker cron scheduler.
///
/// Registration is append-only until [`start`](Self::start); the task list
/// is frozen thereafter.
pub struct CronScheduler {
    tasks: Vec<ScheduledTask>,
    started: bool,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CronScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            started: false,
            shutdown: CancellationToken::new(),
            worker: None,
        }
    }

    /// Registers a task. An invalid cron expression rejects the task with
    /// an error log; the scheduler itself keeps going. Registration after
    /// [`start`](Self::start) is rejected.
    pub fn add(&mut self, task: Task) {
        if self.started {
            log::error!(
                "[Scheduler] attempted to add task {} after start",
                task.name
            );
            return;
        }
        match Schedule::from_str(&task.cron) {
            Ok(schedule) => self.tasks.push(ScheduledTask {
                name: task.name,
                cron: task.cron,
                schedule,
                job: task.job,
                next_fire: None,
            }),
            Err(err) => {
                log::error!(
                    "[Scheduler] task {} has a bad cron expression {:?}: {}",
                    task.name,
                    task.cron,
                    err
                );
            }
        }
    }

    /// Number of accepted tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Launches the worker. Returns `false` without starting anything when
    /// no tasks were registered.
    pub fn start(&mut self) -> bool {
        if self.tasks.is_empty() {
            return false;
        }
        self.started = true;

        for task in &self.tasks {
            log::info!(
                "[Scheduler] {}: enabled - schedule {}",
                task.name,
                task.cron
            );
        }

        let tasks = std::mem::take(&mut self.tasks);
        let shutdown = self.shutdown.clone();
        self.worker = Some(tokio::spawn(worker_loop(tasks, shutdown)));
        true
    }

    /// Signals the worker and waits for it (and any in-flight job) to
    /// finish.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(mut tasks: Vec<ScheduledTask>, shutdown: CancellationToken) {
    loop {
        let now = Local::now();
        for task in &mut tasks {
            if task.next_fire.is_none() {
                task.next_fire = task.schedule.after(&now).next();
            }
        }

        // A schedule with no future fire (possible with an exhausted year
        // field) simply drops out of the wake computation.
        let Some(wake_at) = tasks.iter().filter_map(|t| t.next_fire).min() else {
            shutdown.cancelled().await;
            break;
        };

        let sleep_for = (wake_at - now).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }

        let now = Local::now();
        for task in &mut tasks {
            // Shutdown between due tasks: stop dispatching, current job has
            // already returned.
            if shutdown.is_cancelled() {
                break;
            }
            let Some(due) = task.next_fire else { continue };
            if due > now {
                continue;
            }

            log::trace!("[Scheduler] executing {}", task.name);
            match AssertUnwindSafe(task.job.run(&shutdown)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::warn!("[Scheduler] task {} failed: {}", task.name, err);
                }
                Err(_) => {
                    log::error!("[Scheduler] task {} panicked", task.name);
                }
            }
            task.next_fire = task.schedule.after(&Local::now()).next();
        }

        if shutdown.is_cancelled() {
            break;
        }
    }
    log::info!("[Scheduler] worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
    }

    impl CountingJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CronJob for CountingJob {
        async fn run(&self, _shutdown: &CancellationToken) -> LoomisResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_with_no_tasks_returns_false() {
        let mut scheduler = CronScheduler::new();
        assert!(!scheduler.start());
        assert!(scheduler.worker.is_none());
    }

    #[tokio::test]
    async fn bad_cron_expression_rejects_task() {
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("bad", "not a cron", CountingJob::new()));
        assert_eq!(scheduler.task_count(), 0);
        assert!(!scheduler.start());
    }

    #[tokio::test]
    async fn six_field_expressions_are_accepted() {
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("quick", "30 */5 * * * *", CountingJob::new()));
        scheduler.add(Task::new("nightly", "0 45 3 * * *", CountingJob::new()));
        assert_eq!(scheduler.task_count(), 2);
    }

    #[tokio::test]
    async fn add_after_start_is_rejected() {
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("a", "* * * * * *", CountingJob::new()));
        assert!(scheduler.start());
        scheduler.add(Task::new("late", "* * * * * *", CountingJob::new()));
        assert_eq!(scheduler.task_count(), 0); // frozen list moved to worker
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_second_task_fires_and_shutdown_is_prompt() {
        let job = CountingJob::new();
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("tick", "* * * * * *", Arc::clone(&job) as _));
        assert!(scheduler.start());

        // An every-second schedule must fire within ~2s of wall clock.
        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert!(job.runs.load(Ordering::SeqCst) >= 1);

        let begun = std::time::Instant::now();
        scheduler.shutdown().await;
        assert!(begun.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_waits_for_in_flight_job() {
        struct SlowJob {
            finished: AtomicUsize,
        }

        #[async_trait]
        impl CronJob for SlowJob {
            async fn run(&self, _shutdown: &CancellationToken) -> LoomisResult<()> {
                tokio::time::sleep(Duration::from_millis(400)).await;
                self.finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let job = Arc::new(SlowJob {
            finished: AtomicUsize::new(0),
        });
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("slow", "* * * * * *", Arc::clone(&job) as _));
        assert!(scheduler.start());

        // Let the job start, then shut down mid-run.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        scheduler.shutdown().await;
        assert!(job.finished.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_job_does_not_stop_the_worker() {
        struct FailingJob;

        #[async_trait]
        impl CronJob for FailingJob {
            async fn run(&self, _shutdown: &CancellationToken) -> LoomisResult<()> {
                Err(crate::error::LoomisError::Config("boom".into()))
            }
        }

        let counting = CountingJob::new();
        let mut scheduler = CronScheduler::new();
        scheduler.add(Task::new("fails", "* * * * * *", Arc::new(FailingJob)));
        scheduler.add(Task::new("counts", "* * * * * *", Arc::clone(&counting) as _));
        assert!(scheduler.start());

        tokio::time::sleep(Duration::from_millis(2200)).await;
        scheduler.shutdown().await;
        assert!(counting.runs.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn next_fire_follows_local_zone() {
        // The scheduler computes fires against the local zone; a daily
        // expression must produce a 03:45:00 local fire time.
        let schedule = Schedule::from_str("0 45 3 * * *").unwrap();
        let next = schedule.after(&Local::now()).next().unwrap();
        use chrono::Timelike;
        assert_eq!(next.hour(), 3);
        assert_eq!(next.minute(), 45);
        assert_eq!(next.second(), 0);
    }
}
