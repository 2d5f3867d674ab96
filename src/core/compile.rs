//! Library compile step
//!
//! Stages the project's and the dependencies' sources into the library
//! directory, writes the compiler flags for the engine, and runs the compile
//! command there. The step is skipped when the build cache reports that
//! nothing changed.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::defaults;
use crate::core::cache::{BuildCache, CompileInputs, DependencyInputs};
use crate::core::manifest::{CompileConfig, Project};
use crate::core::resolver::Resolution;
use crate::error::{CacheError, CompileError};
use crate::infra::filesystem;

/// Command-line overrides for a compile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Rebuild even if the cache says the library is current
    pub force: bool,
    /// Debug symbols and runtime checks
    pub debug: bool,
    /// Code coverage instrumentation
    pub coverage: bool,
}

/// What the compile step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The library was rebuilt
    Compiled,
    /// The library was already current
    UpToDate,
    /// The project declares no primary source
    NothingToCompile,
}

/// Compiler flags for a configuration and overrides
pub fn derive_flags(config: &CompileConfig, options: &CompileOptions, lib_dir: &Path) -> Vec<String> {
    let mut flags = config.flags.clone();

    if config.debug_symbols || options.debug {
        flags.push("-g".to_string());
    }
    if config.runtime_checks || options.debug {
        flags.extend(["-check".to_string(), "all".to_string()]);
    }
    if config.compiletime_checks {
        flags.extend(["-warn".to_string(), "all".to_string()]);
    }
    if config.code_coverage || options.coverage {
        flags.push("-prof-gen=srcpos".to_string());
        flags.push(format!("-prof-dir={}", lib_dir.display()));
    }

    flags
}

/// Every compile input of the project and its resolved dependencies
pub fn compile_inputs(project: &Project, resolution: &Resolution) -> CompileInputs {
    let compile = &project.manifest.compile;
    CompileInputs {
        primary: compile.source.as_deref().map(|s| project.path(s)),
        includes: compile.include.iter().map(|s| project.path(s)).collect(),
        sources: compile.sources.iter().map(|s| project.path(s)).collect(),
        dependencies: resolution.in_order().map(DependencyInputs::from).collect(),
    }
}

/// Build the project library if its inputs changed
///
/// A failed build forgets the recorded digest so the next run retries.
pub async fn compile_library(
    project: &Project,
    resolution: &Resolution,
    options: &CompileOptions,
) -> Result<CompileOutcome, CompileError> {
    let config = &project.manifest.compile;
    if config.source.is_none() {
        tracing::debug!("No primary source, skipping compile");
        return Ok(CompileOutcome::NothingToCompile);
    }

    let cache = BuildCache::new(project.lib_dir());
    let inputs = compile_inputs(project, resolution);
    let flags = derive_flags(config, options, cache.lib_dir());
    tracing::debug!("Flags = {flags:?}");

    if options.force {
        cache.invalidate()?;
    }
    if !cache.needs_rebuild(&inputs, config, &flags)? {
        tracing::info!("Library is up to date");
        return Ok(CompileOutcome::UpToDate);
    }

    match build(&cache, &inputs, config, &flags).await {
        Ok(()) => Ok(CompileOutcome::Compiled),
        Err(e) => {
            if let Err(invalidate) = cache.invalidate() {
                tracing::warn!("{invalidate}");
            }
            Err(e)
        }
    }
}

async fn build(
    cache: &BuildCache,
    inputs: &CompileInputs,
    config: &CompileConfig,
    flags: &[String],
) -> Result<(), CompileError> {
    let lib_dir = cache.lib_dir();
    filesystem::create_dir_all(lib_dir)?;

    for file in inputs.files()? {
        filesystem::copy_into(&file, lib_dir)?;
    }

    let flag_list = serde_json::to_string(flags).map_err(|e| CacheError::Serialize(e.to_string()))?;
    filesystem::write_file(
        &lib_dir.join(&config.env_file),
        &format!("compile_fortran.extend({flag_list})\n"),
    )?;

    let source = inputs
        .primary
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let command = render_command(&config.command, &source, &lib_dir.display().to_string(), flags);
    let (program, args) = command.split_first().ok_or(CompileError::NoCommand)?;

    let log = lib_dir.join(defaults::COMPILE_LOG_FILE);
    let spawn_error = |error: String| CompileError::Spawn {
        command: command.join(" "),
        error,
    };
    let stdout = File::create(&log).map_err(|e| spawn_error(e.to_string()))?;
    let stderr = stdout.try_clone().map_err(|e| spawn_error(e.to_string()))?;

    tracing::info!("Compiling {source}");
    tracing::debug!("Running command \"{}\"", command.join(" "));

    let status = Command::new(program)
        .args(args)
        .current_dir(lib_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .await
        .map_err(|e| spawn_error(e.to_string()))?;

    if status.success() {
        Ok(())
    } else {
        Err(CompileError::Failed {
            status: status.code().unwrap_or(defaults::FAILURE_EXIT_STATUS),
            log,
        })
    }
}

/// Fill in a compile command template
///
/// An argument that is exactly `{flags}` expands to one argument per flag;
/// inside a longer argument the flags are joined with spaces.
fn render_command(template: &[String], source: &str, dir: &str, flags: &[String]) -> Vec<String> {
    let joined = flags.join(" ");
    let mut command = Vec::with_capacity(template.len() + flags.len());
    for arg in template {
        if arg == "{flags}" {
            command.extend(flags.iter().cloned());
        } else {
            command.push(
                arg.replace("{source}", source)
                    .replace("{dir}", dir)
                    .replace("{flags}", &joined),
            );
        }
    }
    command
}
