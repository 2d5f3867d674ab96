//! Per-run context
//!
//! Carries what used to be ambient process state through a run: the
//! requested verbosity, the tracing span all run output is recorded under,
//! the cancellation token, and the credential agent shared by every git
//! subprocess.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::infra::dirs::OrcaDirs;
use crate::infra::git::GitClient;
use crate::infra::ssh_agent::LazyAgent;

/// Output verbosity requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    /// Progress and warnings
    Normal,
    /// Commands run and cache decisions
    Verbose,
    /// Everything
    Trace,
}

impl Verbosity {
    /// Verbosity from `-v` count and `-q`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Default `tracing` filter directive
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        }
    }
}

/// State shared by every component of one run
#[derive(Debug)]
pub struct RunContext {
    verbosity: Verbosity,
    span: tracing::Span,
    cancel: CancellationToken,
    agent: Arc<LazyAgent>,
}

impl RunContext {
    /// Context for a run over `project`
    pub fn new(project: &str, verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            span: tracing::info_span!("orca", project = project),
            cancel: CancellationToken::new(),
            agent: Arc::new(LazyAgent::new(OrcaDirs::new())),
        }
    }

    /// Use `agent` instead of the system ssh-agent
    #[must_use]
    pub fn with_agent(mut self, agent: LazyAgent) -> Self {
        self.agent = Arc::new(agent);
        self
    }

    /// Requested verbosity
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Span run output is recorded under
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Token cancelling the run
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Git client sharing the run's credential agent
    ///
    /// The agent is obtained the first time the client contacts an ssh
    /// remote, whether that remote is declared by the project or discovered
    /// in a dependency's manifest.
    pub fn git_client(&self) -> GitClient {
        GitClient::new().with_agent(Arc::clone(&self.agent))
    }
}
