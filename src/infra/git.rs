//! Git operations
//!
//! Drives the `git` command line tool against a single local working copy.
//! Every operation runs `git -C <repo> ...` so the caller's working
//! directory is never changed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use thiserror::Error;

use crate::infra::ssh_agent::LazyAgent;

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// git is not installed or cannot be executed
    #[error("git is not available in this environment - install git to fetch dependencies")]
    Unavailable,

    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Failed to checkout ref
    #[error("Failed to checkout ref '{reference}' in '{repo}': {error}")]
    CheckoutFailed {
        repo: String,
        reference: String,
        error: String,
    },

    /// Any other git command exited unsuccessfully
    #[error("'git {command}' failed in '{repo}': {error}")]
    CommandFailed {
        repo: String,
        command: String,
        error: String,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Version control operations needed to materialize a dependency checkout
///
/// Implementations never retry; callers decide update policy.
pub trait VersionControl {
    /// Fail with [`GitError::Unavailable`] if the tool cannot be invoked
    fn ensure_available(&self) -> Result<(), GitError>;

    /// Set up credentials before contacting `remote` (clone or fetch)
    fn prepare_remote(&self, _remote: &str) {}

    /// Clone `remote` into `dest` (which must not exist yet)
    fn clone_repo(&self, remote: &str, dest: &Path) -> Result<(), GitError>;

    /// Check out a branch, tag or commit in place
    fn checkout(&self, repo: &Path, reference: &str) -> Result<(), GitError>;

    /// Whether tracked files carry uncommitted changes
    fn is_dirty(&self, repo: &Path) -> bool;

    /// Whether HEAD is pinned to a commit rather than a named branch
    fn is_detached(&self, repo: &Path) -> bool;

    /// Full SHA of HEAD
    fn current_commit(&self, repo: &Path) -> Result<String, GitError>;

    /// Tag pointing exactly at HEAD, if any
    fn resolve_tag(&self, repo: &Path) -> Option<String>;

    /// Commit SHA that `reference` peels to, if it exists locally
    fn resolve_ref(&self, repo: &Path, reference: &str) -> Option<String>;

    /// Fetch branches and tags from the default remote
    fn fetch_remote(&self, repo: &Path) -> Result<(), GitError>;

    /// Fast-forward the current branch to its upstream
    fn merge_tracked_branch(&self, repo: &Path) -> Result<(), GitError>;
}

/// git CLI client
#[derive(Debug, Clone, Default)]
pub struct GitClient {
    /// Credential agent, started once an ssh remote is contacted
    agent: Option<Arc<LazyAgent>>,
}

impl GitClient {
    /// Create a client that inherits the current environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the agent's environment to git once an ssh remote needs it
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<LazyAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    fn command(&self, repo: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        // Never block on a credential prompt; the agent is the only auth path
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(agent) = self.agent.as_deref().and_then(LazyAgent::current) {
            cmd.envs(agent.envs());
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run git and capture its output
    fn run<S: AsRef<OsStr>>(&self, repo: Option<&Path>, args: &[S]) -> Result<Output, GitError> {
        let mut cmd = self.command(repo);
        cmd.args(args);
        tracing::debug!(
            "Running git {} in {}",
            args.iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            repo.map_or_else(|| ".".to_string(), |r| r.display().to_string())
        );
        cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::Unavailable
            } else {
                GitError::IoError {
                    path: repo.map(Path::to_path_buf).unwrap_or_default(),
                    error: e.to_string(),
                }
            }
        })
    }

    /// Run git and require a zero exit status
    fn run_checked(&self, repo: &Path, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run(Some(repo), args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                repo: repo.display().to_string(),
                command: args.join(" "),
                error: stderr_of(&output),
            })
        }
    }

    /// Initialise a bare repository at `path` (test support)
    pub fn init_bare(&self, path: &Path) -> Result<(), GitError> {
        create_dir(path)?;
        self.run_checked(path, &["init", "--bare", "--quiet", "--initial-branch=main"])?;
        Ok(())
    }

    /// Initialise a working repository at `path` (test support)
    pub fn init(&self, path: &Path) -> Result<(), GitError> {
        create_dir(path)?;
        self.run_checked(path, &["init", "--quiet", "--initial-branch=main"])?;
        Ok(())
    }

    /// Add a remote named origin (test support)
    pub fn add_remote(&self, path: &Path, url: &str) -> Result<(), GitError> {
        self.run_checked(path, &["remote", "add", "origin", url])?;
        Ok(())
    }

    /// Stage everything and commit (test support)
    pub fn add_and_commit(&self, path: &Path, message: &str) -> Result<(), GitError> {
        self.run_checked(path, &["add", "-A"])?;
        self.run_checked(
            path,
            &[
                "-c",
                "user.name=orca",
                "-c",
                "user.email=orca@localhost",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "--allow-empty",
                "-m",
                message,
            ],
        )?;
        Ok(())
    }

    /// Tag HEAD (test support)
    pub fn add_tag(&self, path: &Path, tag: &str) -> Result<(), GitError> {
        self.run_checked(path, &["tag", tag])?;
        Ok(())
    }

    /// Push the current branch and all tags to origin (test support)
    pub fn push(&self, path: &Path) -> Result<(), GitError> {
        self.run_checked(path, &["push", "--quiet", "--tags", "origin", "HEAD"])?;
        Ok(())
    }
}

impl VersionControl for GitClient {
    fn ensure_available(&self) -> Result<(), GitError> {
        which::which("git").map_err(|_| GitError::Unavailable)?;
        let output = self.run(None, &["--version"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::Unavailable)
        }
    }

    fn prepare_remote(&self, remote: &str) {
        if let Some(agent) = &self.agent {
            agent.for_remote(remote);
        }
    }

    fn clone_repo(&self, remote: &str, dest: &Path) -> Result<(), GitError> {
        self.prepare_remote(remote);
        if let Some(parent) = dest.parent() {
            create_dir(parent)?;
        }
        let output = self.run(
            None,
            &[
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new(remote),
                dest.as_os_str(),
            ],
        )?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::CloneFailed {
                url: remote.to_string(),
                error: stderr_of(&output),
            })
        }
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<(), GitError> {
        let output = self.run(Some(repo), &["checkout", "--quiet", reference])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::CheckoutFailed {
                repo: repo.display().to_string(),
                reference: reference.to_string(),
                error: stderr_of(&output),
            })
        }
    }

    fn is_dirty(&self, repo: &Path) -> bool {
        match self.run(Some(repo), &["status", "--porcelain", "--untracked-files=no"]) {
            Ok(output) if output.status.success() => !output.stdout.is_empty(),
            Ok(output) => {
                tracing::debug!("git status failed in {}: {}", repo.display(), stderr_of(&output));
                false
            }
            Err(e) => {
                tracing::debug!("git status failed in {}: {e}", repo.display());
                false
            }
        }
    }

    fn is_detached(&self, repo: &Path) -> bool {
        self.run(Some(repo), &["symbolic-ref", "--quiet", "HEAD"])
            .map_or(true, |output| !output.status.success())
    }

    fn current_commit(&self, repo: &Path) -> Result<String, GitError> {
        let output = self.run_checked(repo, &["rev-parse", "HEAD"])?;
        Ok(stdout_of(&output))
    }

    fn resolve_tag(&self, repo: &Path) -> Option<String> {
        let output = self
            .run(Some(repo), &["describe", "--tags", "--exact-match", "HEAD"])
            .ok()?;
        let tag = stdout_of(&output);
        (output.status.success() && !tag.is_empty()).then_some(tag)
    }

    fn resolve_ref(&self, repo: &Path, reference: &str) -> Option<String> {
        let spec = format!("{reference}^{{commit}}");
        let output = self
            .run(Some(repo), &["rev-parse", "--verify", "--quiet", &spec])
            .ok()?;
        let sha = stdout_of(&output);
        (output.status.success() && !sha.is_empty()).then_some(sha)
    }

    fn fetch_remote(&self, repo: &Path) -> Result<(), GitError> {
        self.run_checked(repo, &["fetch", "--quiet", "--tags", "origin"])?;
        Ok(())
    }

    fn merge_tracked_branch(&self, repo: &Path) -> Result<(), GitError> {
        self.run_checked(repo, &["merge", "--quiet", "--ff-only", "@{upstream}"])?;
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), GitError> {
    std::fs::create_dir_all(path).map_err(|e| GitError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ssh_agent::AgentEnv;
    use tempfile::TempDir;

    fn git_available() -> bool {
        GitClient::new().ensure_available().is_ok()
    }

    fn has_env(cmd: &Command, key: &str) -> bool {
        cmd.get_envs().any(|(k, v)| k == key && v.is_some())
    }

    #[test]
    fn test_agent_env_follows_ssh_remotes() {
        let agent = LazyAgent::from_source(|| {
            Ok(AgentEnv {
                auth_sock: PathBuf::from("/tmp/orca-test/agent.sock"),
                agent_pid: None,
            })
        });
        let git = GitClient::new().with_agent(Arc::new(agent));

        git.prepare_remote("https://example.com/group/lib.git");
        assert!(!has_env(&git.command(None), "SSH_AUTH_SOCK"));

        git.prepare_remote("git@example.com:group/lib.git");
        assert!(has_env(&git.command(None), "SSH_AUTH_SOCK"));
        assert!(has_env(&git.clone().command(Some(Path::new("/repo"))), "SSH_AUTH_SOCK"));
    }

    /// Bare upstream with one tagged commit on main, plus a clone of it
    fn upstream_with_tag(temp: &TempDir) -> (GitClient, PathBuf, PathBuf) {
        let git = GitClient::new();
        let remote = temp.path().join("remote.git");
        let work = temp.path().join("work");
        git.init_bare(&remote).unwrap();
        git.init(&work).unwrap();
        git.add_remote(&work, remote.to_str().unwrap()).unwrap();
        std::fs::write(work.join("lib.f"), "! v1\n").unwrap();
        git.add_and_commit(&work, "first").unwrap();
        git.add_tag(&work, "v1").unwrap();
        git.push(&work).unwrap();
        (git, remote, work)
    }

    #[test]
    fn test_git_error_messages() {
        let err = GitError::CheckoutFailed {
            repo: "deps/a".to_string(),
            reference: "v2".to_string(),
            error: "pathspec 'v2' did not match".to_string(),
        };
        assert!(err.to_string().contains("v2"));
        assert!(err.to_string().contains("deps/a"));
        assert!(GitError::Unavailable.to_string().contains("git"));
    }

    #[test]
    fn test_clone_and_checkout_tag() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let (git, remote, _work) = upstream_with_tag(&temp);

        let dest = temp.path().join("deps").join("a");
        git.clone_repo(remote.to_str().unwrap(), &dest).unwrap();
        assert!(dest.join(".git").exists());

        git.checkout(&dest, "v1").unwrap();
        assert!(git.is_detached(&dest));
        assert_eq!(git.resolve_tag(&dest).as_deref(), Some("v1"));
        assert_eq!(
            git.resolve_ref(&dest, "v1"),
            Some(git.current_commit(&dest).unwrap())
        );
    }

    #[test]
    fn test_branch_checkout_is_not_detached() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let (git, remote, _work) = upstream_with_tag(&temp);

        let dest = temp.path().join("clone");
        git.clone_repo(remote.to_str().unwrap(), &dest).unwrap();
        git.checkout(&dest, "main").unwrap();
        assert!(!git.is_detached(&dest));
        assert_eq!(git.current_commit(&dest).unwrap().len(), 40);
    }

    #[test]
    fn test_is_dirty_tracks_modified_files() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let (git, _remote, work) = upstream_with_tag(&temp);

        assert!(!git.is_dirty(&work));
        std::fs::write(work.join("lib.f"), "! edited\n").unwrap();
        assert!(git.is_dirty(&work));
    }

    #[test]
    fn test_is_dirty_outside_repository_is_false() {
        let temp = TempDir::new().unwrap();
        assert!(!GitClient::new().is_dirty(temp.path()));
    }

    #[test]
    fn test_clone_invalid_remote_fails() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let result = GitClient::new().clone_repo(
            temp.path().join("missing.git").to_str().unwrap(),
            &temp.path().join("dest"),
        );
        match result {
            Err(GitError::CloneFailed { url, .. }) => assert!(url.contains("missing.git")),
            other => panic!("Expected CloneFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_checkout_unknown_ref_fails() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let (git, _remote, work) = upstream_with_tag(&temp);
        assert!(matches!(
            git.checkout(&work, "no-such-tag"),
            Err(GitError::CheckoutFailed { .. })
        ));
        assert!(git.resolve_ref(&work, "no-such-tag").is_none());
    }

    #[test]
    fn test_fetch_and_fast_forward() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let (git, remote, work) = upstream_with_tag(&temp);

        let dest = temp.path().join("follower");
        git.clone_repo(remote.to_str().unwrap(), &dest).unwrap();
        git.checkout(&dest, "main").unwrap();
        let before = git.current_commit(&dest).unwrap();

        std::fs::write(work.join("lib.f"), "! v2\n").unwrap();
        git.add_and_commit(&work, "second").unwrap();
        git.push(&work).unwrap();

        git.fetch_remote(&dest).unwrap();
        git.merge_tracked_branch(&dest).unwrap();
        let after = git.current_commit(&dest).unwrap();
        assert_ne!(before, after);
        assert_eq!(after, git.current_commit(&work).unwrap());
    }
}
