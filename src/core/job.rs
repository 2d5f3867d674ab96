//! Supervised worker jobs
//!
//! A [`Job`] owns one external worker process from staging to exit. Its
//! lifecycle is `Pending -> Running -> Completed | Terminated`; the terminal
//! states are final and the exit is observed exactly once.
//!
//! Each job runs in its own directory under the output directory, holding the
//! staged job file, the redirected output streams and a [`JobRecord`].

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};

use crate::config::defaults;
use crate::core::manifest::{JobSpec, WorkerConfig};
use crate::error::JobError;
use crate::infra::filesystem;

/// Where a job comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// A `[[job]]` entry of the manifest
    FromManifestEntry(JobSpec),
    /// A job file named directly on the command line
    FromDirectPath(PathBuf),
}

impl JobSource {
    /// Job name: manifest name, else the job file stem
    pub fn name(&self) -> String {
        match self {
            Self::FromManifestEntry(spec) => spec.display_name(),
            Self::FromDirectPath(path) => file_stem(path),
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Staged, not launched
    Pending,
    /// Worker process alive
    Running,
    /// Worker exited on its own, or never started
    Completed,
    /// Worker was stopped by cancellation
    Terminated,
}

impl JobState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

/// How workers are invoked for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    /// Worker command template
    pub command: Vec<String>,
    /// Cancellation companion command template
    pub cancel: Option<Vec<String>>,
    /// Compiled library directory, substituted for `{lib}`
    pub lib_dir: PathBuf,
    /// CPUs per job, substituted for `{cpus}`
    pub cpus: u32,
    /// Engine environment file written into each job directory
    pub env_file: String,
}

impl WorkerInvocation {
    /// Invocation described by the manifest's `[worker]` table
    pub fn new(config: &WorkerConfig, lib_dir: PathBuf) -> Self {
        Self {
            command: config.command.clone(),
            cancel: config.cancel.clone(),
            lib_dir,
            cpus: config.cpus,
            env_file: config.env_file.clone(),
        }
    }

    fn render(&self, template: &[String], job: &str, dir: &Path) -> Vec<String> {
        let dir = dir.display().to_string();
        let lib = self.lib_dir.display().to_string();
        let cpus = self.cpus.to_string();
        template
            .iter()
            .map(|arg| {
                arg.replace("{job}", job)
                    .replace("{dir}", &dir)
                    .replace("{lib}", &lib)
                    .replace("{cpus}", &cpus)
            })
            .collect()
    }
}

/// Persisted job state, `job.json` in the job directory
///
/// Lets a separate process inspect or post-process a run after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Record layout version
    pub format_version: u32,
    /// Job name
    pub name: String,
    /// Staged job file
    pub job_file: PathBuf,
    /// Job directory
    pub job_dir: PathBuf,
    /// Rendered worker command
    pub command: Vec<String>,
    /// State when the record was written
    pub state: JobState,
    /// Launch time, milliseconds since the Unix epoch
    #[serde(default)]
    pub started_at_ms: Option<u64>,
    /// Exit time, milliseconds since the Unix epoch
    #[serde(default)]
    pub finished_at_ms: Option<u64>,
    /// Wall-clock run time
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Worker exit status
    #[serde(default)]
    pub exit_status: Option<i32>,
}

impl JobRecord {
    /// Current record layout
    pub const FORMAT_VERSION: u32 = 1;

    /// Read the record from a job directory
    pub fn load(job_dir: &Path) -> Result<Self, JobError> {
        let path = job_dir.join(defaults::JOB_RECORD_FILE);
        let record_error = |error: String| JobError::Record {
            path: path.clone(),
            error,
        };

        let content = filesystem::read_file(&path).map_err(|e| record_error(e.to_string()))?;
        let record: Self =
            serde_json::from_str(&content).map_err(|e| record_error(e.to_string()))?;
        if record.format_version > Self::FORMAT_VERSION {
            return Err(record_error(format!(
                "unsupported format version {} (expected at most {})",
                record.format_version,
                Self::FORMAT_VERSION
            )));
        }
        Ok(record)
    }

    /// Write the record into its job directory
    pub fn save(&self) -> Result<(), JobError> {
        let path = self.job_dir.join(defaults::JOB_RECORD_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| JobError::Record {
            path: path.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file_atomic(&path, &json).map_err(|e| JobError::Record {
            path,
            error: e.to_string(),
        })
    }
}

/// One worker run
#[derive(Debug)]
pub struct Job {
    name: String,
    job_file: PathBuf,
    job_dir: PathBuf,
    command: Vec<String>,
    cancel_command: Option<Vec<String>>,
    lib_dir: PathBuf,
    state: JobState,
    child: Option<Child>,
    started: Option<Instant>,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    duration: Option<Duration>,
    exit_status: Option<i32>,
}

impl Job {
    /// Prepare a job directory and return the pending job
    ///
    /// Allocates `<output>/<name>_<n>` (first `n` not in use), copies the job
    /// file and its includes there, writes the library environment file and
    /// the initial record. Manifest paths are relative to `project_root`.
    pub fn stage(
        source: &JobSource,
        project_root: &Path,
        output_dir: &Path,
        worker: &WorkerInvocation,
    ) -> Result<Self, JobError> {
        let name = source.name();
        let staging = |source| JobError::Staging {
            job: name.clone(),
            source,
        };

        let (job_file, includes) = match source {
            JobSource::FromManifestEntry(spec) => (
                project_root.join(&spec.job_file),
                spec.include.iter().map(|i| project_root.join(i)).collect(),
            ),
            JobSource::FromDirectPath(path) => (path.clone(), Vec::new()),
        };

        let job_dir = allocate_job_dir(output_dir, &name);
        filesystem::create_dir_all(&job_dir).map_err(staging)?;

        let staged_file = filesystem::copy_into(&job_file, &job_dir).map_err(staging)?;
        for include in &includes {
            filesystem::copy_into(include, &job_dir).map_err(staging)?;
        }
        filesystem::write_file(
            &job_dir.join(&worker.env_file),
            &format!("usub_lib_dir = \"{}\"\n", worker.lib_dir.display()),
        )
        .map_err(staging)?;

        let stem = file_stem(&staged_file);
        let command = worker.render(&worker.command, &stem, &job_dir);
        let cancel_command = worker
            .cancel
            .as_ref()
            .map(|cancel| worker.render(cancel, &stem, &job_dir));

        tracing::debug!("Staged job {name} in {}", job_dir.display());

        let job = Self {
            name,
            job_file: staged_file,
            job_dir,
            command,
            cancel_command,
            lib_dir: worker.lib_dir.clone(),
            state: JobState::Pending,
            child: None,
            started: None,
            started_at: None,
            finished_at: None,
            duration: None,
            exit_status: None,
        };
        job.record().save()?;
        Ok(job)
    }

    /// Job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Job directory
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Rendered worker command
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Exit status, once observed
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Run time, once the exit was observed
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Snapshot of the persisted state
    pub fn record(&self) -> JobRecord {
        JobRecord {
            format_version: JobRecord::FORMAT_VERSION,
            name: self.name.clone(),
            job_file: self.job_file.clone(),
            job_dir: self.job_dir.clone(),
            command: self.command.clone(),
            state: self.state,
            started_at_ms: self.started_at.map(epoch_millis),
            finished_at_ms: self.finished_at.map(epoch_millis),
            duration_secs: self.duration.map(|d| d.as_secs_f64()),
            exit_status: self.exit_status,
        }
    }

    /// Spawn the worker in the job directory
    ///
    /// Output goes to `<stem>.stdout` and `<stem>.stderr`. If the worker
    /// cannot be spawned the job completes immediately with the failure
    /// sentinel status and the error is returned.
    pub fn launch(&mut self) -> Result<(), JobError> {
        if self.state != JobState::Pending {
            return Ok(());
        }

        match self.spawn() {
            Ok(child) => {
                tracing::info!("Launched job {} ({})", self.name, self.job_dir.display());
                self.child = Some(child);
                self.started = Some(Instant::now());
                self.started_at = Some(SystemTime::now());
                self.state = JobState::Running;
                self.persist();
                Ok(())
            }
            Err(e) => {
                let now = SystemTime::now();
                self.started_at = Some(now);
                self.finished_at = Some(now);
                self.duration = Some(Duration::ZERO);
                self.exit_status = Some(defaults::FAILURE_EXIT_STATUS);
                self.state = JobState::Completed;
                self.persist();
                Err(e)
            }
        }
    }

    fn spawn(&self) -> Result<Child, JobError> {
        let (program, args) = self.command.split_first().ok_or_else(|| JobError::NoCommand {
            job: self.name.clone(),
        })?;
        let launch_error = |error: String| JobError::Launch {
            job: self.name.clone(),
            command: self.command.join(" "),
            error,
        };

        let stem = file_stem(&self.job_file);
        let stdout = File::create(self.job_dir.join(format!("{stem}.stdout")))
            .map_err(|e| launch_error(e.to_string()))?;
        let stderr = File::create(self.job_dir.join(format!("{stem}.stderr")))
            .map_err(|e| launch_error(e.to_string()))?;

        tracing::debug!("Running command \"{}\"", self.command.join(" "));

        Command::new(program)
            .args(args)
            .current_dir(&self.job_dir)
            .env("ORCA_JOB_DIR", &self.job_dir)
            .env("ORCA_LIB_DIR", &self.lib_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(e.to_string()))
    }

    /// Non-blocking liveness check; records the exit on first observation
    pub fn poll(&mut self) -> Result<bool, JobError> {
        if self.state != JobState::Running {
            return Ok(false);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.observe_exit(status, JobState::Completed);
                Ok(false)
            }
            Ok(None) => Ok(true),
            Err(e) => Err(JobError::Wait {
                job: self.name.clone(),
                error: e.to_string(),
            }),
        }
    }

    /// Whether the worker is still alive
    pub fn is_running(&mut self) -> bool {
        self.poll().unwrap_or_else(|e| {
            tracing::debug!("{e}");
            false
        })
    }

    /// Block until the worker exits and return its status
    ///
    /// Safe to call after [`Job::poll`] or [`Job::terminate`] observed the
    /// exit. A job that never ran reports the failure sentinel.
    pub async fn wait(&mut self) -> Result<i32, JobError> {
        if self.state == JobState::Running {
            if let Some(child) = self.child.as_mut() {
                let status = child.wait().await.map_err(|e| JobError::Wait {
                    job: self.name.clone(),
                    error: e.to_string(),
                })?;
                self.observe_exit(status, JobState::Completed);
            }
        }
        Ok(self.exit_status.unwrap_or(defaults::FAILURE_EXIT_STATUS))
    }

    /// Stop a running worker and ask the engine to abort the job
    ///
    /// Kills the process, then runs the cancellation companion command in the
    /// job directory and waits for it. Does nothing once the job has
    /// finished, so calling it repeatedly is harmless. A failed liveness
    /// check does not prevent the kill.
    pub async fn terminate(&mut self) -> Result<(), JobError> {
        if let Err(e) = self.poll() {
            tracing::debug!("{e}");
        }
        if self.state != JobState::Running {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };

        tracing::info!("Terminating job {}", self.name);
        if let Err(e) = child.start_kill() {
            tracing::debug!("Kill of job {} failed: {e}", self.name);
        }
        let status = child.wait().await.map_err(|e| JobError::Wait {
            job: self.name.clone(),
            error: e.to_string(),
        })?;
        self.observe_exit(status, JobState::Terminated);

        match &self.cancel_command {
            Some(cancel) => self.run_cancel_command(cancel).await,
            None => Ok(()),
        }
    }

    async fn run_cancel_command(&self, cancel: &[String]) -> Result<(), JobError> {
        let cancel_error = |error: String| JobError::Cancel {
            job: self.name.clone(),
            error,
        };
        let Some((program, args)) = cancel.split_first() else {
            return Ok(());
        };

        tracing::debug!("Running command \"{}\"", cancel.join(" "));
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.job_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| cancel_error(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(cancel_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    fn observe_exit(&mut self, status: ExitStatus, state: JobState) {
        if self.state.is_terminal() {
            return;
        }
        self.exit_status = Some(status.code().unwrap_or(defaults::FAILURE_EXIT_STATUS));
        self.finished_at = Some(SystemTime::now());
        self.duration = self.started.map(|started| started.elapsed());
        self.state = state;
        self.child = None;

        tracing::debug!(
            "Job {} finished with status {} after {:.1}s",
            self.name,
            self.exit_status.unwrap_or(defaults::FAILURE_EXIT_STATUS),
            self.duration.unwrap_or_default().as_secs_f64()
        );
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.record().save() {
            tracing::warn!("{e}");
        }
    }
}

/// First `<output>/<name>_<n>` that does not exist yet
pub fn allocate_job_dir(output_dir: &Path, name: &str) -> PathBuf {
    (0u32..)
        .map(|n| output_dir.join(format!("{name}_{n}")))
        .find(|dir| !dir.exists())
        .unwrap_or_else(|| output_dir.join(name))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::jobs::{sh_worker, staged_job};
    use tempfile::TempDir;

    #[test]
    fn test_allocate_job_dir_skips_existing() {
        let temp = TempDir::new().unwrap();
        assert_eq!(allocate_job_dir(temp.path(), "plate"), temp.path().join("plate_0"));

        std::fs::create_dir(temp.path().join("plate_0")).unwrap();
        std::fs::create_dir(temp.path().join("plate_1")).unwrap();
        assert_eq!(allocate_job_dir(temp.path(), "plate"), temp.path().join("plate_2"));
    }

    #[test]
    fn test_job_source_names() {
        let spec = JobSpec {
            name: None,
            job_file: "jobs/beam.inp".to_string(),
            include: Vec::new(),
            tags: Vec::new(),
        };
        assert_eq!(JobSource::FromManifestEntry(spec).name(), "beam");
        assert_eq!(
            JobSource::FromDirectPath(PathBuf::from("/tmp/plate.inp")).name(),
            "plate"
        );
    }

    #[test]
    fn test_stage_copies_files_and_renders_command() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("jobs")).unwrap();
        std::fs::write(temp.path().join("jobs").join("beam.inp"), "*HEADING").unwrap();
        std::fs::write(temp.path().join("jobs").join("mesh.inp"), "*NODE").unwrap();

        let source = JobSource::FromManifestEntry(JobSpec {
            name: Some("beam-fine".to_string()),
            job_file: "jobs/beam.inp".to_string(),
            include: vec!["jobs/mesh.inp".to_string()],
            tags: Vec::new(),
        });
        let worker = WorkerInvocation {
            command: vec!["solver".into(), "job={job}".into(), "cpus={cpus}".into(), "lib={lib}".into()],
            cancel: Some(vec!["solver".into(), "terminate".into(), "job={job}".into()]),
            lib_dir: PathBuf::from("/opt/lib"),
            cpus: 4,
            env_file: defaults::ENGINE_ENV_FILE.to_string(),
        };

        let output = temp.path().join("output");
        let job = Job::stage(&source, temp.path(), &output, &worker).unwrap();

        assert_eq!(job.name(), "beam-fine");
        assert_eq!(job.job_dir(), output.join("beam-fine_0"));
        assert!(job.job_dir().join("beam.inp").is_file());
        assert!(job.job_dir().join("mesh.inp").is_file());
        assert_eq!(job.command(), ["solver", "job=beam", "cpus=4", "lib=/opt/lib"]);
        assert_eq!(job.state(), JobState::Pending);

        let env = std::fs::read_to_string(job.job_dir().join("abaqus_v6.env")).unwrap();
        assert_eq!(env.trim(), r#"usub_lib_dir = "/opt/lib""#);

        let record = JobRecord::load(job.job_dir()).unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.format_version, 1);
        assert!(record.exit_status.is_none());

        let again = Job::stage(&source, temp.path(), &output, &worker).unwrap();
        assert_eq!(again.job_dir(), output.join("beam-fine_1"));
    }

    #[test]
    fn test_stage_missing_job_file_fails() {
        let temp = TempDir::new().unwrap();
        let source = JobSource::FromDirectPath(temp.path().join("absent.inp"));
        let result = Job::stage(&source, temp.path(), temp.path(), &sh_worker("true"));
        assert!(matches!(result, Err(JobError::Staging { .. })));
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let temp = TempDir::new().unwrap();
        let mut job = staged_job(&temp, "ok", "echo out; echo err >&2; exit 3");

        job.launch().unwrap();
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.wait().await.unwrap(), 3);
        assert_eq!(job.state(), JobState::Completed);
        assert!(!job.is_running());
        // Waiting again returns the recorded status
        assert_eq!(job.wait().await.unwrap(), 3);

        let stdout = std::fs::read_to_string(job.job_dir().join("ok.stdout")).unwrap();
        let stderr = std::fs::read_to_string(job.job_dir().join("ok.stderr")).unwrap();
        assert_eq!(stdout.trim(), "out");
        assert_eq!(stderr.trim(), "err");

        let record = JobRecord::load(job.job_dir()).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.exit_status, Some(3));
        assert!(record.finished_at_ms >= record.started_at_ms);
    }

    #[tokio::test]
    async fn test_worker_sees_job_environment() {
        let temp = TempDir::new().unwrap();
        let mut job = staged_job(&temp, "env", "echo \"$ORCA_JOB_DIR\" > where.txt");

        job.launch().unwrap();
        assert_eq!(job.wait().await.unwrap(), 0);
        let recorded = std::fs::read_to_string(job.job_dir().join("where.txt")).unwrap();
        assert_eq!(recorded.trim(), job.job_dir().display().to_string());
    }

    #[tokio::test]
    async fn test_poll_observes_exit_once() {
        let temp = TempDir::new().unwrap();
        let mut job = staged_job(&temp, "quick", "exit 0");

        job.launch().unwrap();
        while job.poll().unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let duration = job.duration();
        assert!(duration.is_some());
        assert!(!job.poll().unwrap());
        assert_eq!(job.duration(), duration);
        assert_eq!(job.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_uses_sentinel_status() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.inp"), "").unwrap();
        let worker = WorkerInvocation {
            command: vec!["/nonexistent/orca-worker".to_string()],
            cancel: None,
            lib_dir: temp.path().join("lib"),
            cpus: 1,
            env_file: defaults::ENGINE_ENV_FILE.to_string(),
        };
        let source = JobSource::FromDirectPath(temp.path().join("broken.inp"));
        let mut job = Job::stage(&source, temp.path(), &temp.path().join("out"), &worker).unwrap();

        assert!(matches!(job.launch(), Err(JobError::Launch { .. })));
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.wait().await.unwrap(), defaults::FAILURE_EXIT_STATUS);
    }

    #[tokio::test]
    async fn test_terminate_runs_cancel_command_once() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("long.inp"), "").unwrap();
        let worker = WorkerInvocation {
            command: vec!["sh".into(), "-c".into(), "sleep 30".into()],
            cancel: Some(vec!["sh".into(), "-c".into(), "echo {job} >> cancelled.txt".into()]),
            lib_dir: temp.path().join("lib"),
            cpus: 1,
            env_file: defaults::ENGINE_ENV_FILE.to_string(),
        };
        let source = JobSource::FromDirectPath(temp.path().join("long.inp"));
        let mut job = Job::stage(&source, temp.path(), &temp.path().join("out"), &worker).unwrap();

        job.launch().unwrap();
        assert!(job.is_running());
        job.terminate().await.unwrap();
        assert_eq!(job.state(), JobState::Terminated);
        assert!(!job.is_running());

        // Second call is a no-op
        job.terminate().await.unwrap();
        let cancelled = std::fs::read_to_string(job.job_dir().join("cancelled.txt")).unwrap();
        assert_eq!(cancelled.lines().collect::<Vec<_>>(), ["long"]);

        let record = JobRecord::load(job.job_dir()).unwrap();
        assert_eq!(record.state, JobState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_finished_job_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut job = staged_job(&temp, "done", "exit 0");

        job.launch().unwrap();
        assert_eq!(job.wait().await.unwrap(), 0);
        job.terminate().await.unwrap();
        assert_eq!(job.state(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_terminate_observes_an_unnoticed_exit() {
        let temp = TempDir::new().unwrap();
        let mut job = staged_job(&temp, "gone", "exit 4");

        job.launch().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        job.terminate().await.unwrap();

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.exit_status(), Some(4));
    }

    #[test]
    fn test_record_from_newer_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("job.json"),
            r#"{"format_version": 2, "name": "x", "job_file": "x.inp", "job_dir": ".", "command": [], "state": "pending"}"#,
        )
        .unwrap();
        assert!(matches!(
            JobRecord::load(temp.path()),
            Err(JobError::Record { .. })
        ));
    }
}
