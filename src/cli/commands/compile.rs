//! CLI implementation for `orca compile` command

use std::path::Path;

use anyhow::{Context, Result};

use super::fetch::resolve_dependencies;
use crate::cli::output::{create_spinner, print_warnings, status};
use crate::core::compile::{compile_library, CompileOptions, CompileOutcome};
use crate::core::context::{RunContext, Verbosity};
use crate::core::manifest::Project;
use crate::core::resolver::Resolution;

/// Execute the compile command
pub async fn execute(path: &Path, verbosity: Verbosity, options: CompileOptions) -> Result<()> {
    let project = super::load_project(path)?;
    let ctx = RunContext::new(&project.manifest.project.name, verbosity);

    let resolution = resolve_dependencies(&project, &ctx)?;
    print_warnings(&resolution.warnings);

    compile_step(&project, &resolution, &ctx, &options).await?;
    Ok(())
}

/// Run the compile step and report its outcome
pub(crate) async fn compile_step(
    project: &Project,
    resolution: &Resolution,
    ctx: &RunContext,
    options: &CompileOptions,
) -> Result<CompileOutcome> {
    let spinner = (ctx.verbosity() == Verbosity::Normal).then(|| create_spinner("Compiling library"));

    let outcome = compile_library(project, resolution, options)
        .await
        .with_context(|| "Failed to compile library");

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match outcome? {
        CompileOutcome::Compiled => {
            println!("{} Compiled library in {}", status::SUCCESS, project.lib_dir().display());
            Ok(CompileOutcome::Compiled)
        }
        CompileOutcome::UpToDate => {
            println!("{} Library is up to date", status::SUCCESS);
            Ok(CompileOutcome::UpToDate)
        }
        CompileOutcome::NothingToCompile => Ok(CompileOutcome::NothingToCompile),
    }
}
