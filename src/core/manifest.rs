//! Manifest (orca.toml) parsing and validation
//!
//! The manifest describes a project: its compile inputs, the sibling projects
//! it depends on, the worker command, and the jobs that can be run. Fetched
//! dependencies carry their own manifest in the same format.
//! String values support environment variable substitution using `${VAR}`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::error::ManifestError;

/// The project manifest (orca.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project configuration
    pub project: ProjectConfig,

    /// Library compilation inputs and options
    #[serde(default)]
    pub compile: CompileConfig,

    /// External worker invocation
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Sibling projects fetched from version control, in declaration order
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencySpec>,

    /// Jobs that can be selected for a run
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project name; a fetched dependency must declare the name it is fetched under
    pub name: String,

    /// Output directory, relative to the manifest
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_output() -> String {
    defaults::DEFAULT_OUTPUT_DIR.to_string()
}

/// Compilation inputs and options
///
/// Serialized canonically into the build digest, so every field that changes
/// the compiled library belongs here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileConfig {
    /// Primary source file (absent for pure libraries)
    #[serde(default)]
    pub source: Option<String>,

    /// Include files or directories
    #[serde(default)]
    pub include: Vec<String>,

    /// Auxiliary source files or directories
    #[serde(default)]
    pub sources: Vec<String>,

    /// Extra compiler flags, passed through untouched
    #[serde(default)]
    pub flags: Vec<String>,

    /// Emit debug symbols
    #[serde(default)]
    pub debug_symbols: bool,

    /// Enable runtime checks
    #[serde(default)]
    pub runtime_checks: bool,

    /// Enable compile-time warnings
    #[serde(default)]
    pub compiletime_checks: bool,

    /// Instrument for code coverage
    #[serde(default)]
    pub code_coverage: bool,

    /// Compile command template (`{source}`, `{dir}`, `{flags}` placeholders)
    #[serde(default = "default_compile_command")]
    pub command: Vec<String>,

    /// Engine environment file receiving the flags, in the library directory
    #[serde(default = "default_env_file")]
    pub env_file: String,
}

fn default_env_file() -> String {
    defaults::ENGINE_ENV_FILE.to_string()
}

fn default_compile_command() -> Vec<String> {
    to_strings(defaults::DEFAULT_COMPILE_COMMAND)
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            source: None,
            include: Vec::new(),
            sources: Vec::new(),
            flags: Vec::new(),
            debug_symbols: false,
            runtime_checks: false,
            compiletime_checks: false,
            code_coverage: false,
            command: default_compile_command(),
            env_file: default_env_file(),
        }
    }
}

/// External worker invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Worker command template (`{job}`, `{dir}`, `{lib}`, `{cpus}` placeholders)
    #[serde(default = "default_worker_command")]
    pub command: Vec<String>,

    /// Companion command asking the engine to abort a named job
    #[serde(default = "default_cancel_command")]
    pub cancel: Option<Vec<String>>,

    /// CPUs per job, substituted for `{cpus}`
    #[serde(default = "default_cpus")]
    pub cpus: u32,

    /// Liveness polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Engine environment file pointing the worker at the library
    #[serde(default = "default_env_file")]
    pub env_file: String,
}

fn default_worker_command() -> Vec<String> {
    to_strings(defaults::DEFAULT_WORKER_COMMAND)
}

#[allow(clippy::unnecessary_wraps)]
fn default_cancel_command() -> Option<Vec<String>> {
    Some(to_strings(defaults::DEFAULT_CANCEL_COMMAND))
}

fn default_cpus() -> u32 {
    1
}

#[allow(clippy::cast_possible_truncation)]
fn default_poll_interval_ms() -> u64 {
    defaults::POLL_INTERVAL.as_millis() as u64
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            cancel: default_cancel_command(),
            cpus: default_cpus(),
            poll_interval_ms: default_poll_interval_ms(),
            env_file: default_env_file(),
        }
    }
}

/// A dependency declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DependencySpec {
    /// Dependency name; also its checkout directory name
    pub name: String,

    /// Repository URL or path understood by git
    #[serde(rename = "git")]
    pub repository_url: String,

    /// Branch, tag or commit to check out
    #[serde(rename = "version")]
    pub version_ref: String,
}

impl DependencySpec {
    /// Create a dependency declaration
    pub fn new(
        name: impl Into<String>,
        repository_url: impl Into<String>,
        version_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repository_url: repository_url.into(),
            version_ref: version_ref.into(),
        }
    }
}

/// A job declared in the manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Job name (defaults to the job file stem)
    #[serde(default)]
    pub name: Option<String>,

    /// Input file handed to the worker, relative to the manifest
    pub job_file: String,

    /// Extra files copied next to the job file
    #[serde(default)]
    pub include: Vec<String>,

    /// Tags used to select groups of jobs
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JobSpec {
    /// Name used for selection and job directories
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            Path::new(&self.job_file)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.job_file.clone())
        })
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Substitute environment variables in a string using `${VAR}` syntax.
///
/// Unset variables expand to an empty string.
///
/// # Examples
/// ```
/// use orca::core::manifest::substitute_env_vars;
///
/// std::env::set_var("ORCA_DOC_VAR", "hello");
/// let result = substitute_env_vars("prefix_${ORCA_DOC_VAR}_suffix");
/// assert_eq!(result, "prefix_hello_suffix");
/// std::env::remove_var("ORCA_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s);
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item);
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v);
            }
        }
        _ => {}
    }
}

impl Manifest {
    /// Load a manifest file, substituting `${VAR}` in every string value
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let parse_error = |error: String| ManifestError::Parse {
            path: path.to_path_buf(),
            error,
        };
        let mut value: toml::Value =
            toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        substitute_in_value(&mut value);
        Self::deserialize(value).map_err(|e| parse_error(e.to_string()))
    }

    /// Parse a manifest from a TOML string (no substitution)
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Collect every validation problem, relative to the manifest directory
    pub fn problems(&self, root: &Path) -> Vec<String> {
        let mut problems = Vec::new();

        if self.project.name.trim().is_empty() {
            problems.push("project.name must not be empty".to_string());
        }

        if let Some(source) = &self.compile.source {
            if !root.join(source).is_file() {
                problems.push(format!("compile.source '{source}' does not exist"));
            }
        }

        if self.worker.command.is_empty() {
            problems.push("worker.command must not be empty".to_string());
        }
        if self.worker.poll_interval_ms == 0 {
            problems.push("worker.poll_interval_ms must be greater than zero".to_string());
        }
        if matches!(&self.worker.cancel, Some(cancel) if cancel.is_empty()) {
            problems.push("worker.cancel must not be an empty list".to_string());
        }
        for (key, file) in [
            ("compile.env_file", &self.compile.env_file),
            ("worker.env_file", &self.worker.env_file),
        ] {
            if !is_plain_file_name(file) {
                problems.push(format!("{key} '{file}' must be a plain file name"));
            }
        }

        for dep in &self.dependencies {
            if dep.name.trim().is_empty() {
                problems.push("dependency.name must not be empty".to_string());
            }
            if dep.repository_url.trim().is_empty() {
                problems.push(format!("dependency '{}' has an empty git url", dep.name));
            }
            if dep.version_ref.trim().is_empty() {
                problems.push(format!("dependency '{}' has an empty version", dep.name));
            }
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.job_file.trim().is_empty() {
                problems.push("job.job_file must not be empty".to_string());
                continue;
            }
            let name = job.display_name();
            if !seen.insert(name.clone()) {
                problems.push(format!("job name '{name}' is declared more than once"));
            }
        }

        problems
    }
}

/// A loaded manifest together with the directory it lives in
#[derive(Debug, Clone)]
pub struct Project {
    /// Parsed manifest
    pub manifest: Manifest,
    /// Directory containing orca.toml
    pub root: PathBuf,
}

impl Project {
    /// Load and validate the manifest in `root`
    pub fn load(root: &Path) -> Result<Self, ManifestError> {
        let path = root.join(defaults::MANIFEST_FILE);
        let manifest = Manifest::load(&path)?;
        let problems = manifest.problems(root);
        if !problems.is_empty() {
            return Err(ManifestError::Invalid { path, problems });
        }
        tracing::debug!("Loaded manifest for project '{}'", manifest.project.name);
        Ok(Self {
            manifest,
            root: root.to_path_buf(),
        })
    }

    /// Resolve a manifest-relative path
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Output directory
    pub fn output_dir(&self) -> PathBuf {
        self.path(&self.manifest.project.output)
    }

    /// Compiled library directory
    pub fn lib_dir(&self) -> PathBuf {
        self.output_dir().join(defaults::LIB_DIR)
    }

    /// Directory holding dependency checkouts
    pub fn dependencies_dir(&self) -> PathBuf {
        self.root.join(defaults::DEPENDENCIES_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{dependency_name, repository_url, version_ref};
    use proptest::prelude::*;
    use tempfile::TempDir;

    const FULL_MANIFEST: &str = r#"
[project]
name = "plate-model"
output = "out"

[compile]
source = "src/usub.f"
include = ["src/inc"]
flags = ["-O2"]
debug_symbols = true

[worker]
command = ["solver", "job={job}"]
cpus = 4
poll_interval_ms = 250

[[dependency]]
name = "materials"
git = "git@example.com:lab/materials.git"
version = "v1.2.0"

[[dependency]]
name = "meshing"
git = "https://example.com/lab/meshing.git"
version = "main"

[[job]]
name = "plate"
job_file = "jobs/plate.inp"
tags = ["smoke", "plates"]

[[job]]
job_file = "jobs/beam.inp"
include = ["jobs/mesh.inp"]
"#;

    #[test]
    fn test_manifest_deserializes_from_valid_toml() {
        let manifest = Manifest::from_toml(FULL_MANIFEST).unwrap();
        assert_eq!(manifest.project.name, "plate-model");
        assert_eq!(manifest.project.output, "out");
        assert_eq!(manifest.compile.source.as_deref(), Some("src/usub.f"));
        assert!(manifest.compile.debug_symbols);
        assert_eq!(manifest.worker.cpus, 4);
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.dependencies[0].repository_url, "git@example.com:lab/materials.git");
        assert_eq!(manifest.dependencies[1].version_ref, "main");
        assert_eq!(manifest.jobs[1].display_name(), "beam");
    }

    #[test]
    fn test_manifest_default_values() {
        let manifest = Manifest::from_toml("[project]\nname = \"lib\"\n").unwrap();
        assert_eq!(manifest.project.output, "output");
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.jobs.is_empty());
        assert_eq!(manifest.compile.command, default_compile_command());
        assert_eq!(manifest.worker.command, default_worker_command());
        assert_eq!(manifest.worker.poll_interval_ms, 1000);
        assert!(manifest.worker.cancel.is_some());
        assert_eq!(manifest.compile.env_file, "abaqus_v6.env");
        assert_eq!(manifest.worker.env_file, "abaqus_v6.env");
    }

    #[test]
    fn test_env_file_must_be_a_plain_name() {
        let temp = TempDir::new().unwrap();
        let manifest = Manifest::from_toml(
            "[project]\nname = \"lib\"\n\n[compile]\nenv_file = \"../x.env\"\n\n[worker]\nenv_file = \"\"\n",
        )
        .unwrap();

        let problems = manifest.problems(temp.path());
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems[0].contains("compile.env_file"));
        assert!(problems[1].contains("worker.env_file"));
    }

    #[test]
    fn test_manifest_missing_required_project_name() {
        assert!(Manifest::from_toml("[project]\noutput = \"x\"\n").is_err());
    }

    #[test]
    fn test_dependency_order_is_preserved() {
        let manifest = Manifest::from_toml(FULL_MANIFEST).unwrap();
        let names: Vec<_> = manifest.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["materials", "meshing"]);
    }

    #[test]
    fn test_problems_reports_every_issue() {
        let temp = TempDir::new().unwrap();
        let manifest = Manifest::from_toml(
            r#"
[project]
name = ""

[compile]
source = "missing.f"

[worker]
command = []

[[job]]
job_file = "a.inp"

[[job]]
name = "a"
job_file = "other/a.inp"
"#,
        )
        .unwrap();

        let problems = manifest.problems(temp.path());
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("project.name")));
        assert!(problems.iter().any(|p| p.contains("missing.f")));
        assert!(problems.iter().any(|p| p.contains("worker.command")));
        assert!(problems.iter().any(|p| p.contains("'a'")));
    }

    #[test]
    fn test_load_substitutes_environment() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("ORCA_TEST_DEP_HOST", "git.example.org");
        std::fs::write(
            temp.path().join("orca.toml"),
            r#"
[project]
name = "env-project"

[[dependency]]
name = "lib"
git = "https://${ORCA_TEST_DEP_HOST}/lib.git"
version = "v1"
"#,
        )
        .unwrap();

        let project = Project::load(temp.path()).unwrap();
        assert_eq!(
            project.manifest.dependencies[0].repository_url,
            "https://git.example.org/lib.git"
        );
        std::env::remove_var("ORCA_TEST_DEP_HOST");
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Project::load(temp.path()),
            Err(ManifestError::NotFound { .. })
        ));
    }

    #[test]
    fn test_project_paths() {
        let project = Project {
            manifest: Manifest::from_toml(FULL_MANIFEST).unwrap(),
            root: PathBuf::from("/work/model"),
        };
        assert_eq!(project.output_dir(), PathBuf::from("/work/model/out"));
        assert_eq!(project.lib_dir(), PathBuf::from("/work/model/out/lib"));
        assert_eq!(
            project.dependencies_dir(),
            PathBuf::from("/work/model/dependencies")
        );
    }

    #[test]
    fn test_substitute_unset_variable_is_empty() {
        assert_eq!(substitute_env_vars("a${ORCA_SURELY_UNSET_VAR}b"), "ab");
        assert_eq!(substitute_env_vars("no vars"), "no vars");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(defaults::MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn prop_manifest_toml_roundtrip(
            name in dependency_name(),
            deps in proptest::collection::vec((dependency_name(), repository_url(), version_ref()), 0..5),
        ) {
            let mut manifest = Manifest::from_toml(&format!("[project]\nname = \"{name}\"\n")).unwrap();
            manifest.dependencies = deps
                .iter()
                .map(|(n, url, v)| DependencySpec::new(n.clone(), url.clone(), v.clone()))
                .collect();

            let toml = manifest.to_toml().unwrap();
            let parsed = Manifest::from_toml(&toml).unwrap();
            prop_assert_eq!(parsed, manifest);
        }
    }
}
