//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use orca::infra::git::{GitClient, VersionControl};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the orca binary in the project directory
    pub fn orca(&self, args: &[&str]) -> Output {
        run_orca(self.dir.path(), args)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the orca binary in `dir`
pub fn run_orca(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_orca"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("ORCA_PROJECT_DIR")
        .env("ORCA_CACHE_DIR", dir.join(".orca-cache"))
        .output()
        .expect("Failed to run orca")
}

/// Whether git can be invoked; git-backed tests return early without it
pub fn git_available() -> bool {
    GitClient::new().ensure_available().is_ok()
}

/// Manifest of a dependency project declaring `deps` as `(name, url, version)`
pub fn dependency_manifest(name: &str, deps: &[(&str, &str, &str)]) -> String {
    let mut manifest = format!(
        "[project]\nname = \"{name}\"\n\n[compile]\ninclude = [\"inc\"]\nsources = [\"src\"]\n"
    );
    for (dep, url, version) in deps {
        manifest.push_str(&format!(
            "\n[[dependency]]\nname = \"{dep}\"\ngit = \"{url}\"\nversion = \"{version}\"\n"
        ));
    }
    manifest
}

/// A bare upstream repository with a working copy used to publish to it
pub struct Upstream {
    /// Bare repository, used as the remote URL
    pub bare: PathBuf,
    /// Working copy commits are made in
    pub work: PathBuf,
    git: GitClient,
}

impl Upstream {
    /// Create `<root>/remotes/<name>.git` and a working copy pointing at it
    pub fn new(root: &Path, name: &str) -> Self {
        let git = GitClient::new();
        let bare = root.join("remotes").join(format!("{name}.git"));
        let work = root.join("upstream-work").join(name);
        git.init_bare(&bare).expect("Failed to init bare repository");
        git.init(&work).expect("Failed to init working copy");
        git.add_remote(&work, &bare.display().to_string())
            .expect("Failed to add remote");
        Self { bare, work, git }
    }

    /// Remote URL for manifests
    pub fn url(&self) -> String {
        self.bare.display().to_string()
    }

    /// Commit `manifest` plus a source file, optionally tag, and push
    pub fn publish(&self, manifest: &str, source: &str, tag: Option<&str>) {
        std::fs::write(self.work.join("orca.toml"), manifest).expect("Failed to write manifest");
        std::fs::create_dir_all(self.work.join("src")).expect("Failed to create src");
        std::fs::create_dir_all(self.work.join("inc")).expect("Failed to create inc");
        std::fs::write(self.work.join("src").join("lib.f"), source).expect("Failed to write source");
        std::fs::write(self.work.join("inc").join("lib.inc"), "").expect("Failed to write include");
        self.git
            .add_and_commit(&self.work, "publish")
            .expect("Failed to commit");
        if let Some(tag) = tag {
            self.git.add_tag(&self.work, tag).expect("Failed to tag");
        }
        self.git.push(&self.work).expect("Failed to push");
    }
}
