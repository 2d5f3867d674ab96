//! Bounded, interruptible execution of worker jobs
//!
//! A single polling loop launches jobs in backlog order while fewer than
//! `concurrency_limit` are alive, then polls until every launched job has
//! exited and collects exit statuses in launch order. The cancellation token
//! is checked on every polling iteration; once triggered, every launched job
//! is terminated and the run fails with
//! [`OrchestratorError::ExecutionInterrupted`].

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::defaults;
use crate::core::job::{Job, JobState};
use crate::error::OrchestratorError;

/// Final state of one launched job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Job name
    pub name: String,
    /// Job directory
    pub job_dir: PathBuf,
    /// Terminal state
    pub state: JobState,
    /// Worker exit status, or the failure sentinel
    pub exit_status: i32,
    /// Wall-clock run time
    pub duration: Option<Duration>,
}

impl JobOutcome {
    /// Whether the worker exited with status 0
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Outcomes in launch order
    pub outcomes: Vec<JobOutcome>,
    /// Largest number of jobs observed alive at once
    pub peak_active: usize,
}

impl RunReport {
    /// Number of jobs that did not exit with status 0
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// Whether every job exited with status 0
    pub fn all_succeeded(&self) -> bool {
        self.failures() == 0
    }
}

/// Runs jobs under a concurrency cap
#[derive(Debug)]
pub struct JobOrchestrator {
    concurrency_limit: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    launched: Vec<Job>,
}

impl JobOrchestrator {
    /// Orchestrator running at most `concurrency_limit` jobs at once (minimum 1)
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
            poll_interval: defaults::POLL_INTERVAL,
            cancel: CancellationToken::new(),
            launched: Vec::new(),
        }
    }

    /// Set the liveness polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Stop the run when `cancel` is triggered
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Concurrency cap
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Jobs launched by the last run, in launch order
    pub fn launched(&self) -> &[Job] {
        &self.launched
    }

    /// Run every job and report exit statuses in launch order
    ///
    /// A job whose worker fails to launch is reported with the failure
    /// sentinel status; the remaining jobs still run.
    pub async fn run_all(&mut self, jobs: Vec<Job>) -> Result<RunReport, OrchestratorError> {
        self.launched.clear();
        let mut peak_active = 0;

        tracing::debug!(
            "Running {} job(s), at most {} at once",
            jobs.len(),
            self.concurrency_limit
        );

        for mut job in jobs {
            while self.active_count() >= self.concurrency_limit {
                self.pause().await?;
            }
            if self.cancel.is_cancelled() {
                return Err(self.interrupt().await);
            }

            if let Err(e) = job.launch() {
                tracing::error!("{e}");
            }
            self.launched.push(job);
            peak_active = peak_active.max(self.active_count());
        }

        while self.active_count() > 0 {
            self.pause().await?;
        }

        let mut outcomes = Vec::with_capacity(self.launched.len());
        for job in &mut self.launched {
            let exit_status = job.wait().await?;
            outcomes.push(JobOutcome {
                name: job.name().to_string(),
                job_dir: job.job_dir().to_path_buf(),
                state: job.state(),
                exit_status,
                duration: job.duration(),
            });
        }

        Ok(RunReport {
            outcomes,
            peak_active,
        })
    }

    fn active_count(&mut self) -> usize {
        self.launched.iter_mut().filter_map(|job| job.is_running().then_some(())).count()
    }

    /// Sleep one polling interval, or terminate everything on cancellation
    async fn pause(&mut self) -> Result<(), OrchestratorError> {
        let cancel = self.cancel.clone();
        let cancelled = tokio::select! {
            () = cancel.cancelled() => true,
            () = tokio::time::sleep(self.poll_interval) => false,
        };
        if cancelled {
            return Err(self.interrupt().await);
        }
        Ok(())
    }

    async fn interrupt(&mut self) -> OrchestratorError {
        tracing::warn!("Interrupted, terminating launched jobs");

        let mut terminated = 0;
        for job in &mut self.launched {
            if job.state() != JobState::Running {
                continue;
            }
            if let Err(e) = job.terminate().await {
                tracing::error!("{e}");
            }
            if job.state() == JobState::Terminated {
                terminated += 1;
            }
        }

        OrchestratorError::ExecutionInterrupted { terminated }
    }
}
