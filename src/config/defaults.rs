//! Default configuration values

use std::time::Duration;

/// Project manifest file name
pub const MANIFEST_FILE: &str = "orca.toml";

/// Directory (next to the manifest) holding dependency checkouts
pub const DEPENDENCIES_DIR: &str = "dependencies";

/// Default output directory, relative to the manifest
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Compiled library directory, relative to the output directory
pub const LIB_DIR: &str = "lib";

/// File in the library directory holding the last compile digest
pub const DIGEST_FILE: &str = ".orca-digest";

/// Extensions of compiled library artifacts
pub const ARTIFACT_EXTENSIONS: &[&str] = &["so", "dll", "dylib", "o", "obj"];

/// Engine environment file, read by the engine from its working directory
///
/// Written into the library directory (compiler flags) and into each job
/// directory (library location).
pub const ENGINE_ENV_FILE: &str = "abaqus_v6.env";

/// Compiler output log in the library directory
pub const COMPILE_LOG_FILE: &str = "compile.log";

/// Job state record written into each job directory
pub const JOB_RECORD_FILE: &str = "job.json";

/// Interval between liveness polls of running jobs
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of jobs run at once
pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// Exit status recorded for a job whose worker never started or reported no code
pub const FAILURE_EXIT_STATUS: i32 = -1;

/// Default worker command template
pub const DEFAULT_WORKER_COMMAND: &[&str] = &["abaqus", "job={job}", "double", "interactive"];

/// Default cancellation command template
pub const DEFAULT_CANCEL_COMMAND: &[&str] = &["abaqus", "terminate", "job={job}"];

/// Default compile command template
pub const DEFAULT_COMPILE_COMMAND: &[&str] = &["abaqus", "make", "library={source}"];

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
