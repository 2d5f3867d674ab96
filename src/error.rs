//! Error types for orca
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::infra::git::GitError;

/// Manifest (orca.toml) errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found at '{path}'")]
    NotFound { path: PathBuf },

    /// Manifest could not be read
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// TOML syntax or schema error
    #[error("Failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Manifest parsed but failed validation
    #[error("Invalid manifest '{path}':\n  {}", problems.join("\n  "))]
    Invalid { path: PathBuf, problems: Vec<String> },
}

/// Dependency resolution errors
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Version control operation failed
    #[error(transparent)]
    Vcs(#[from] GitError),

    /// Dependency manifest declares a different project name
    #[error(
        "Dependency '{expected}' at '{path}' declares itself as '{found}' - check the dependency name in orca.toml"
    )]
    ManifestMismatch {
        expected: String,
        found: String,
        path: PathBuf,
    },

    /// Dependency manifest missing or unreadable
    #[error("Dependency '{name}' has an unusable manifest: {source}")]
    Manifest {
        name: String,
        #[source]
        source: ManifestError,
    },

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}

/// Build cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// An input file could not be read
    #[error("Failed to read compile input '{path}': {error}")]
    ReadInput { path: PathBuf, error: String },

    /// Compile configuration could not be serialized
    #[error("Failed to serialize compile configuration: {0}")]
    Serialize(String),

    /// Digest file could not be written
    #[error("Failed to persist build digest to '{path}': {error}")]
    Persist { path: PathBuf, error: String },
}

/// Compile step errors
#[derive(Error, Debug)]
pub enum CompileError {
    /// Build cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Filesystem error while staging
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Compile command is empty
    #[error("No compile command configured")]
    NoCommand,

    /// Compiler could not be started
    #[error("Failed to run compile command '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Compiler exited unsuccessfully
    #[error("Compilation failed with exit status {status} (see {log})")]
    Failed { status: i32, log: PathBuf },
}

/// Per-job errors
#[derive(Error, Debug)]
pub enum JobError {
    /// Worker process could not be spawned
    #[error("Failed to launch job '{job}' ({command}): {error}")]
    Launch {
        job: String,
        command: String,
        error: String,
    },

    /// Worker command is empty
    #[error("Job '{job}' has no worker command")]
    NoCommand { job: String },

    /// Job file could not be staged
    #[error("Failed to stage job '{job}': {source}")]
    Staging {
        job: String,
        #[source]
        source: FilesystemError,
    },

    /// Waiting on the worker failed
    #[error("Failed to wait for job '{job}': {error}")]
    Wait { job: String, error: String },

    /// Cancellation command failed
    #[error("Failed to cancel job '{job}': {error}")]
    Cancel { job: String, error: String },

    /// Job record could not be read or written
    #[error("Job record '{path}': {error}")]
    Record { path: PathBuf, error: String },
}

/// Orchestration errors
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Run was cancelled; every launched job has been terminated
    #[error("Job execution interrupted ({terminated} launched job(s) terminated)")]
    ExecutionInterrupted { terminated: usize },

    /// Unrecoverable job error
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy file
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}
