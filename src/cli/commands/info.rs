//! CLI implementation for `orca info` command
//!
//! Prints the manifest summary without touching the network.

use std::path::Path;

use anyhow::Result;

use crate::core::cache::BuildCache;

/// Execute the info command
pub async fn execute(path: &Path) -> Result<()> {
    let project = super::load_project(path)?;
    let manifest = &project.manifest;

    println!("Project: {}", manifest.project.name);
    println!("Output:  {}", project.output_dir().display());

    if let Some(source) = &manifest.compile.source {
        let cache = BuildCache::new(project.lib_dir());
        let state = match (cache.has_artifacts(), cache.stored_digest()) {
            (true, Some(_)) => "built",
            (true, None) => "built (unknown inputs)",
            (false, _) => "not built",
        };
        println!("Library: {source} ({state})");
    }

    println!("Worker:  {}", manifest.worker.command.join(" "));

    if !manifest.dependencies.is_empty() {
        println!();
        println!("Dependencies:");
        for dep in &manifest.dependencies {
            let fetched = if project.dependencies_dir().join(&dep.name).is_dir() {
                ""
            } else {
                " (not fetched)"
            };
            println!("    {} {} {}{fetched}", dep.name, dep.version_ref, dep.repository_url);
        }
    }

    if !manifest.jobs.is_empty() {
        println!();
        println!("Jobs:");
        for job in &manifest.jobs {
            if job.tags.is_empty() {
                println!("    {} ({})", job.display_name(), job.job_file);
            } else {
                println!(
                    "    {} ({}) [{}]",
                    job.display_name(),
                    job.job_file,
                    job.tags.join(", ")
                );
            }
        }
    }

    Ok(())
}
