//! CLI implementation for `orca run` command
//!
//! Fetches dependencies, compiles the library, stages the selected jobs and
//! runs them. Ctrl-C terminates every launched job before exiting.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::Instrument;

use super::compile::compile_step;
use super::fetch::resolve_dependencies;
use crate::cli::output::{print_run_summary, print_warnings, status};
use crate::config::defaults;
use crate::core::compile::CompileOptions;
use crate::core::context::{RunContext, Verbosity};
use crate::core::job::{Job, WorkerInvocation};
use crate::core::orchestrator::JobOrchestrator;
use crate::core::selection::select_jobs;

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Job names, tags or job files
    pub specs: Vec<String>,
    /// Concurrency cap
    pub jobs: Option<usize>,
    /// Skip the compile step
    pub no_compile: bool,
    /// Compile overrides
    pub compile: CompileOptions,
}

/// Execute the run command
pub async fn execute(path: &Path, verbosity: Verbosity, options: RunOptions) -> Result<()> {
    let project = super::load_project(path)?;
    let ctx = RunContext::new(&project.manifest.project.name, verbosity);

    let cwd = std::env::current_dir()?;
    let sources = select_jobs(&project.manifest, &cwd, &options.specs);
    if sources.is_empty() {
        println!(
            "{} No jobs match {}",
            status::WARNING,
            options.specs.join(" ")
        );
        return Ok(());
    }

    let resolution = resolve_dependencies(&project, &ctx)?;
    print_warnings(&resolution.warnings);

    if !options.no_compile {
        compile_step(&project, &resolution, &ctx, &options.compile).await?;
    }

    let worker = WorkerInvocation::new(&project.manifest.worker, project.lib_dir());
    let output_dir = project.output_dir();
    let jobs = sources
        .iter()
        .map(|source| Job::stage(source, &project.root, &output_dir, &worker))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| "Failed to stage jobs")?;

    let cancel = ctx.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let limit = options.jobs.unwrap_or_else(defaults::default_concurrency);
    let mut orchestrator = JobOrchestrator::new(limit)
        .with_poll_interval(Duration::from_millis(project.manifest.worker.poll_interval_ms))
        .with_cancellation(ctx.cancellation());

    println!(
        "{} Running {} job(s), at most {} at once",
        status::INFO,
        jobs.len(),
        orchestrator.concurrency_limit()
    );
    let result = orchestrator
        .run_all(jobs)
        .instrument(ctx.span().clone())
        .await;
    interrupt.abort();

    let report = result?;
    print_run_summary(&report);

    if !report.all_succeeded() {
        anyhow::bail!(
            "{} of {} job(s) failed",
            report.failures(),
            report.outcomes.len()
        );
    }
    Ok(())
}
