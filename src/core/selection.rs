//! Job selection from command-line specs
//!
//! A spec is either a path to a job file, or a name or tag matched against
//! the manifest's `[[job]]` entries.

use std::path::{Path, PathBuf};

use crate::core::job::JobSource;
use crate::core::manifest::Manifest;

/// Select the jobs matching `specs`
///
/// Specs naming an existing file come first, in spec order. Manifest jobs
/// follow in declaration order; a job matches when its name equals a spec or
/// one of its tags does, and is selected once however many specs match it.
/// Relative file specs are resolved against `cwd`.
pub fn select_jobs(manifest: &Manifest, cwd: &Path, specs: &[String]) -> Vec<JobSource> {
    let mut selected: Vec<JobSource> = specs
        .iter()
        .map(|spec| cwd.join(spec))
        .filter(|path| path.is_file())
        .map(|path| JobSource::FromDirectPath(absolute(path)))
        .collect();

    selected.extend(
        manifest
            .jobs
            .iter()
            .filter(|job| {
                let name = job.display_name();
                specs.iter().any(|spec| *spec == name || job.tags.contains(spec))
            })
            .cloned()
            .map(JobSource::FromManifestEntry),
    );

    if selected.is_empty() {
        tracing::warn!("No jobs were found matching {specs:?}");
    } else {
        tracing::debug!(
            "Selected jobs: {}",
            selected.iter().map(JobSource::name).collect::<Vec<_>>().join(", ")
        );
    }
    selected
}

fn absolute(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        Manifest::from_toml(
            r#"
[project]
name = "model"

[[job]]
name = "plate"
job_file = "jobs/plate.inp"
tags = ["smoke", "plates"]

[[job]]
job_file = "jobs/beam.inp"
tags = ["smoke"]

[[job]]
job_file = "jobs/shell.inp"
"#,
        )
        .unwrap()
    }

    fn names(selected: &[JobSource]) -> Vec<String> {
        selected.iter().map(JobSource::name).collect()
    }

    fn specs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_select_by_name_and_tag() {
        let temp = TempDir::new().unwrap();
        let manifest = manifest();

        assert_eq!(names(&select_jobs(&manifest, temp.path(), &specs(&["shell"]))), ["shell"]);
        assert_eq!(
            names(&select_jobs(&manifest, temp.path(), &specs(&["smoke"]))),
            ["plate", "beam"]
        );
    }

    #[test]
    fn test_job_matched_by_several_specs_is_selected_once() {
        let temp = TempDir::new().unwrap();
        let selected = select_jobs(&manifest(), temp.path(), &specs(&["plate", "smoke", "plates"]));
        assert_eq!(names(&selected), ["plate", "beam"]);
    }

    #[test]
    fn test_direct_paths_come_first() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("extra.inp"), "*HEADING").unwrap();

        let selected = select_jobs(&manifest(), temp.path(), &specs(&["shell", "extra.inp"]));
        assert_eq!(names(&selected), ["extra", "shell"]);
        assert!(matches!(&selected[0], JobSource::FromDirectPath(p) if p.is_absolute()));
    }

    #[test]
    fn test_no_match_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(select_jobs(&manifest(), temp.path(), &specs(&["nothing"])).is_empty());
    }
}
