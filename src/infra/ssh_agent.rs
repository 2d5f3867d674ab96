//! ssh-agent discovery for git over ssh
//!
//! Dependencies fetched over ssh need a running agent holding the user's
//! identity. A [`LazyAgent`] locates the agent the first time an ssh remote is
//! contacted, at most once per run, and its environment is handed explicitly
//! to git subprocesses:
//!
//! 1. an agent already exported in `SSH_AUTH_SOCK`;
//! 2. an agent started by a previous orca run, cached on disk, whose socket
//!    still exists;
//! 3. a fresh `ssh-agent -s`, which is then cached.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::dirs::OrcaDirs;
use crate::infra::filesystem;

/// Credential agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// ssh-agent could not be started
    #[error("Failed to start ssh-agent: {0}")]
    StartFailed(String),

    /// ssh-agent output was not understood
    #[error("Unrecognised ssh-agent output: {0}")]
    UnparsableOutput(String),

    /// ssh-add failed
    #[error("Failed to add ssh identity: {0}")]
    AddIdentityFailed(String),
}

/// Connection details of a running ssh-agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEnv {
    /// Agent socket (`SSH_AUTH_SOCK`)
    pub auth_sock: PathBuf,
    /// Agent process id (`SSH_AGENT_PID`)
    #[serde(default)]
    pub agent_pid: Option<u32>,
}

impl AgentEnv {
    /// Agent exported by the calling shell, if any
    pub fn from_env() -> Option<Self> {
        let auth_sock = std::env::var_os("SSH_AUTH_SOCK")?;
        let agent_pid = std::env::var("SSH_AGENT_PID")
            .ok()
            .and_then(|pid| pid.parse().ok());
        Some(Self {
            auth_sock: PathBuf::from(auth_sock),
            agent_pid,
        })
    }

    /// Parse the Bourne-shell output of `ssh-agent -s`
    pub fn parse(output: &str) -> Option<Self> {
        static ASSIGNMENT: OnceLock<Regex> = OnceLock::new();
        let re = ASSIGNMENT.get_or_init(|| {
            Regex::new(r"(SSH_AUTH_SOCK|SSH_AGENT_PID)=([^;\s]+);").expect("valid regex")
        });

        let mut auth_sock = None;
        let mut agent_pid = None;
        for cap in re.captures_iter(output) {
            match &cap[1] {
                "SSH_AUTH_SOCK" => auth_sock = Some(PathBuf::from(&cap[2])),
                _ => agent_pid = cap[2].parse().ok(),
            }
        }

        auth_sock.map(|auth_sock| Self {
            auth_sock,
            agent_pid,
        })
    }

    /// Environment variables to hand to child processes
    pub fn envs(&self) -> Vec<(String, String)> {
        let mut envs = vec![(
            "SSH_AUTH_SOCK".to_string(),
            self.auth_sock.display().to_string(),
        )];
        if let Some(pid) = self.agent_pid {
            envs.push(("SSH_AGENT_PID".to_string(), pid.to_string()));
        }
        envs
    }

    /// Whether the agent socket is still present
    pub fn is_alive(&self) -> bool {
        self.auth_sock.exists()
    }
}

type AgentSource = Box<dyn Fn() -> Result<AgentEnv, AgentError> + Send + Sync>;

/// Agent obtained on first use by an ssh remote and shared afterwards
///
/// An agent that cannot be obtained is logged and remembered as absent; git
/// then reports the authentication failure itself.
pub struct LazyAgent {
    source: AgentSource,
    agent: OnceLock<Option<AgentEnv>>,
}

impl LazyAgent {
    /// Locate or start the agent with [`obtain_agent`] and [`ensure_identity`]
    pub fn new(dirs: OrcaDirs) -> Self {
        Self::from_source(move || {
            let agent = obtain_agent(&dirs)?;
            ensure_identity(&agent)?;
            Ok(agent)
        })
    }

    /// Agent produced by `source` on first use
    pub fn from_source(
        source: impl Fn() -> Result<AgentEnv, AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            agent: OnceLock::new(),
        }
    }

    /// Agent for contacting `remote`, obtaining it if `remote` uses ssh
    pub fn for_remote(&self, remote: &str) -> Option<&AgentEnv> {
        if !is_ssh_url(remote) {
            return self.current();
        }
        self.agent
            .get_or_init(|| match (self.source)() {
                Ok(agent) => Some(agent),
                Err(e) => {
                    tracing::warn!("{e}");
                    None
                }
            })
            .as_ref()
    }

    /// Agent obtained so far, if any
    pub fn current(&self) -> Option<&AgentEnv> {
        self.agent.get().and_then(Option::as_ref)
    }
}

impl fmt::Debug for LazyAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyAgent").field("agent", &self.agent.get()).finish_non_exhaustive()
    }
}

/// Whether a repository URL is fetched over ssh
///
/// Matches `ssh://...` and scp-like `user@host:path` forms.
pub fn is_ssh_url(url: &str) -> bool {
    static SCP_LIKE: OnceLock<Regex> = OnceLock::new();
    let re = SCP_LIKE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:").expect("valid regex"));
    url.starts_with("ssh://") || re.is_match(url)
}

/// Locate or start an agent for this run
pub fn obtain_agent(dirs: &OrcaDirs) -> Result<AgentEnv, AgentError> {
    if let Some(agent) = AgentEnv::from_env() {
        tracing::debug!("Using ssh-agent from environment ({})", agent.auth_sock.display());
        return Ok(agent);
    }

    let cache_path = dirs.agent_cache_path();
    if let Some(agent) = load_cached(&cache_path).filter(AgentEnv::is_alive) {
        tracing::debug!("Reusing cached ssh-agent ({})", agent.auth_sock.display());
        return Ok(agent);
    }

    let agent = start_agent()?;
    store_cached(&cache_path, &agent);
    Ok(agent)
}

/// Make sure the agent holds at least one identity, prompting via `ssh-add`
pub fn ensure_identity(agent: &AgentEnv) -> Result<(), AgentError> {
    let listed = Command::new("ssh-add")
        .arg("-l")
        .envs(agent.envs())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| AgentError::AddIdentityFailed(e.to_string()))?;
    if listed.success() {
        return Ok(());
    }

    let status = Command::new("ssh-add")
        .envs(agent.envs())
        .status()
        .map_err(|e| AgentError::AddIdentityFailed(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(AgentError::AddIdentityFailed(format!("ssh-add exited with {status}")))
    }
}

fn start_agent() -> Result<AgentEnv, AgentError> {
    tracing::info!("Starting ssh-agent");
    let output = Command::new("ssh-agent")
        .arg("-s")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| AgentError::StartFailed(e.to_string()))?;
    if !output.status.success() {
        return Err(AgentError::StartFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    AgentEnv::parse(&stdout).ok_or_else(|| AgentError::UnparsableOutput(stdout.trim().to_string()))
}

fn load_cached(path: &Path) -> Option<AgentEnv> {
    let content = filesystem::read_file(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn store_cached(path: &Path, agent: &AgentEnv) {
    let stored = serde_json::to_string_pretty(agent)
        .map_err(|e| e.to_string())
        .and_then(|json| filesystem::write_file(path, &json).map_err(|e| e.to_string()));
    if let Err(e) = stored {
        tracing::debug!("Could not cache ssh-agent details: {e}");
    }
}
