//! CLI implementation for `orca fetch` command
//!
//! Resolves the dependency graph and reports what was materialized.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{print_warnings, status};
use crate::core::context::{RunContext, Verbosity};
use crate::core::manifest::Project;
use crate::core::resolver::{DependencyResolver, Resolution};

/// Execute the fetch command
pub async fn execute(path: &Path, verbosity: Verbosity) -> Result<()> {
    let project = super::load_project(path)?;
    let ctx = RunContext::new(&project.manifest.project.name, verbosity);

    let resolution = resolve_dependencies(&project, &ctx)?;

    if resolution.dependencies.is_empty() {
        println!("{} No dependencies", status::SUCCESS);
        return Ok(());
    }

    println!(
        "{} Resolved {} dependenc{}:",
        status::SUCCESS,
        resolution.dependencies.len(),
        if resolution.dependencies.len() == 1 { "y" } else { "ies" }
    );
    for dep in resolution.in_order() {
        println!("    {} {}", dep.name, dep.version_ref);
    }
    print_warnings(&resolution.warnings);

    Ok(())
}

/// Resolve the project's dependencies into `dependencies/`
pub(crate) fn resolve_dependencies(project: &Project, ctx: &RunContext) -> Result<Resolution> {
    let _span = ctx.span().enter();
    let declared = &project.manifest.dependencies;
    let git = ctx.git_client();

    DependencyResolver::new(&git, project.dependencies_dir())
        .resolve(declared)
        .with_context(|| "Failed to fetch dependencies")
}
