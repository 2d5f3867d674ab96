//! Test utilities
//!
//! Proptest generators and job fixtures shared by unit tests.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid project or dependency name
    pub fn dependency_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a git reference: a tag, a branch or a full commit id
    pub fn version_ref() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..10, 0u32..20, 0u32..50).prop_map(|(a, b, c)| format!("v{a}.{b}.{c}")),
            Just("main".to_string()),
            "[0-9a-f]{40}",
        ]
    }

    /// Generate a repository URL in https or scp-like ssh form
    pub fn repository_url() -> impl Strategy<Value = String> {
        (any::<bool>(), "[a-z]{3,10}", "[a-z0-9-]{1,20}").prop_map(|(ssh, host, repo)| {
            if ssh {
                format!("git@{host}.org:group/{repo}.git")
            } else {
                format!("https://{host}.org/group/{repo}.git")
            }
        })
    }
}

#[cfg(all(test, unix))]
pub mod jobs {
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::defaults;
    use crate::core::job::{Job, JobSource, WorkerInvocation};

    /// Worker running `script` with `sh -c`
    pub fn sh_worker(script: &str) -> WorkerInvocation {
        WorkerInvocation {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            cancel: None,
            lib_dir: Path::new("/nonexistent/lib").to_path_buf(),
            cpus: 1,
            env_file: defaults::ENGINE_ENV_FILE.to_string(),
        }
    }

    /// Stage `<name>.inp` from `temp` into `temp/output` with a shell worker
    pub fn staged_job(temp: &TempDir, name: &str, script: &str) -> Job {
        let job_file = temp.path().join(format!("{name}.inp"));
        std::fs::write(&job_file, "*HEADING\n").unwrap();
        Job::stage(
            &JobSource::FromDirectPath(job_file),
            temp.path(),
            &temp.path().join("output"),
            &sh_worker(script),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::infra::ssh_agent::is_ssh_url;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_dependency_name_generator(name in dependency_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_version_ref_generator(reference in version_ref()) {
            prop_assert!(!reference.is_empty());
            prop_assert!(!reference.contains(char::is_whitespace));
        }

        #[test]
        fn test_repository_url_generator(url in repository_url()) {
            prop_assert_eq!(is_ssh_url(&url), url.starts_with("git@"));
        }
    }
}
