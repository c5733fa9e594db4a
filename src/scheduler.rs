//! # Scheduler
//! Cooperative, single-task job loop.
//!
//! Every tick the scheduler marks jobs whose next run time has passed as
//! `Due`, then runs them one after another to completion. Jobs never run
//! concurrently. A failing job is logged and goes back to `Idle` with its
//! next natural run time; nothing a job does can stop the loop.

use std::future::Future;
use std::time::Duration as StdDuration;

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Weekday};
use metrics::counter;
use tokio::time::MissedTickBehavior;

use crate::ingest::recency::RecencyWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every day at this local time.
    Daily(NaiveTime),
    /// Fixed repeat interval, measured from the previous run.
    Interval(StdDuration),
    /// Once a week on this day at this local time.
    Weekly(Weekday, NaiveTime),
}

fn at(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(time);
    let utc = local - Duration::seconds(i64::from(tz.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, tz)
}

impl Cadence {
    /// First run time strictly after `now`, in the offset of `now`.
    pub fn next_after(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let tz = *now.offset();
        match *self {
            Cadence::Interval(every) => {
                now + Duration::from_std(every).unwrap_or_else(|_| Duration::minutes(1))
            }
            Cadence::Daily(t) => {
                let today = at(now.date_naive(), t, tz);
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Cadence::Weekly(day, t) => {
                let ahead = (7 + day.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = at(now.date_naive() + Duration::days(ahead), t, tz);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }
}

/// Parameters of a digest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestJob {
    pub window: RecencyWindow,
    pub max_items: usize,
    pub include_quote: bool,
    /// Send the "no updates" digest instead of staying quiet.
    pub send_when_empty: bool,
    pub headline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Digest(DigestJob),
    Quote { only_on_change: bool },
    Announce { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Due,
    Running,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub cadence: Cadence,
    pub action: JobAction,
    state: JobState,
    next_run: Option<DateTime<FixedOffset>>,
    last_run: Option<DateTime<FixedOffset>>,
    failures: u32,
}

impl Job {
    pub fn new(name: impl Into<String>, cadence: Cadence, action: JobAction) -> Self {
        Self {
            name: name.into(),
            cadence,
            action,
            state: JobState::Idle,
            next_run: None,
            last_run: None,
            failures: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn next_run(&self) -> Option<DateTime<FixedOffset>> {
        self.next_run
    }

    pub fn last_run(&self) -> Option<DateTime<FixedOffset>> {
        self.last_run
    }

    /// Consecutive failed runs.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Executes a job's pipeline.
#[async_trait::async_trait]
pub trait JobRunner: Send {
    async fn run(&mut self, job: &str, action: &JobAction, now: DateTime<FixedOffset>)
        -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `(job name, succeeded)` in execution order.
    pub ran: Vec<(String, bool)>,
}

pub struct Scheduler {
    jobs: Vec<Job>,
    tick: StdDuration,
}

impl Scheduler {
    pub fn new(jobs: Vec<Job>, tick: StdDuration) -> Self {
        Self { jobs, tick }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Compute first run times. Jobs already scheduled are left alone.
    pub fn prime(&mut self, now: DateTime<FixedOffset>) {
        for job in self.jobs.iter_mut().filter(|j| j.next_run.is_none()) {
            job.next_run = Some(job.cadence.next_after(now));
            tracing::info!(
                target: "scheduler",
                job = %job.name,
                next_run = %job.next_run.map(|t| t.to_rfc3339()).unwrap_or_default(),
                "job scheduled"
            );
        }
    }

    /// Flip every idle job whose time has come to `Due`; returns their indices.
    fn mark_due(&mut self, now: DateTime<FixedOffset>) -> Vec<usize> {
        self.prime(now);
        let mut due = Vec::new();
        for (i, job) in self.jobs.iter_mut().enumerate() {
            if job.state == JobState::Idle && job.next_run.is_some_and(|t| t <= now) {
                job.state = JobState::Due;
                due.push(i);
            }
        }
        due
    }

    async fn run_index<R: JobRunner + ?Sized>(
        &mut self,
        idx: usize,
        now: DateTime<FixedOffset>,
        runner: &mut R,
    ) -> bool {
        let (name, action) = {
            let job = &mut self.jobs[idx];
            job.state = JobState::Running;
            (job.name.clone(), job.action.clone())
        };

        tracing::info!(target: "scheduler", job = %name, "job started");
        let result = runner.run(&name, &action, now).await;

        let job = &mut self.jobs[idx];
        job.state = JobState::Idle;
        job.last_run = Some(now);
        job.next_run = Some(job.cadence.next_after(now));

        match result {
            Ok(()) => {
                job.failures = 0;
                counter!("scheduler_job_runs_total", "job" => name.clone(), "outcome" => "ok")
                    .increment(1);
                tracing::info!(target: "scheduler", job = %name, "job finished");
                true
            }
            Err(e) => {
                job.failures += 1;
                counter!("scheduler_job_runs_total", "job" => name.clone(), "outcome" => "error")
                    .increment(1);
                tracing::error!(
                    target: "scheduler",
                    job = %name,
                    failures = job.failures,
                    error = ?e,
                    "job failed; waiting for next cadence"
                );
                false
            }
        }
    }

    /// Run every due job sequentially, in configuration order.
    pub async fn tick<R: JobRunner + ?Sized>(
        &mut self,
        now: DateTime<FixedOffset>,
        runner: &mut R,
    ) -> TickReport {
        let mut report = TickReport::default();
        for idx in self.mark_due(now) {
            let ok = self.run_index(idx, now, runner).await;
            report.ran.push((self.jobs[idx].name.clone(), ok));
        }
        report
    }

    /// Run one named job immediately (startup check). Its cadence restarts from `now`.
    pub async fn run_now<R: JobRunner + ?Sized>(
        &mut self,
        name: &str,
        now: DateTime<FixedOffset>,
        runner: &mut R,
    ) -> Result<bool> {
        let Some(idx) = self.jobs.iter().position(|j| j.name == name) else {
            bail!("unknown job {name:?}");
        };
        Ok(self.run_index(idx, now, runner).await)
    }

    /// Tick until `shutdown` resolves. A tick in progress always completes.
    pub async fn run_until<R, C, S>(&mut self, runner: &mut R, clock: C, shutdown: S)
    where
        R: JobRunner + ?Sized,
        C: Fn() -> DateTime<FixedOffset>,
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "scheduler", "shutdown requested; scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick(clock(), runner).await;
                    if !report.ran.is_empty() {
                        tracing::debug!(target: "scheduler", ran = ?report.ran, "tick done");
                    }
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix. A listener that cannot be
/// installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received; finishing current tick"),
        _ = terminate => tracing::info!("SIGTERM received; finishing current tick"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ict() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daily_next_is_today_or_tomorrow() {
        let c = Cadence::Daily(hm(9, 0));
        let before = ict().with_ymd_and_hms(2025, 10, 13, 8, 59, 0).unwrap();
        assert_eq!(
            c.next_after(before),
            ict().with_ymd_and_hms(2025, 10, 13, 9, 0, 0).unwrap()
        );
        let exactly = ict().with_ymd_and_hms(2025, 10, 13, 9, 0, 0).unwrap();
        assert_eq!(
            c.next_after(exactly),
            ict().with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekly_next_wraps_around() {
        // 2025-10-13 is a Monday
        let c = Cadence::Weekly(Weekday::Sun, hm(20, 0));
        let mon = ict().with_ymd_and_hms(2025, 10, 13, 12, 0, 0).unwrap();
        assert_eq!(
            c.next_after(mon),
            ict().with_ymd_and_hms(2025, 10, 19, 20, 0, 0).unwrap()
        );
        let c = Cadence::Weekly(Weekday::Mon, hm(9, 0));
        assert_eq!(
            c.next_after(mon),
            ict().with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn interval_counts_from_now() {
        let c = Cadence::Interval(StdDuration::from_secs(600));
        let now = ict().with_ymd_and_hms(2025, 10, 13, 12, 0, 0).unwrap();
        assert_eq!(c.next_after(now), now + Duration::minutes(10));
    }
}
