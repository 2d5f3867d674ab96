//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod clean;
pub mod compile;
pub mod fetch;
pub mod info;
pub mod run;

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::compile::CompileOptions;
use crate::core::context::Verbosity;
use crate::core::manifest::Project;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and update dependencies
    Fetch,

    /// Fetch dependencies and compile the user library if needed
    Compile {
        /// Rebuild even if nothing changed
        #[arg(short, long)]
        force: bool,

        /// Compile with debug symbols and runtime checks
        #[arg(short, long)]
        debug: bool,

        /// Compile with code coverage instrumentation
        #[arg(long)]
        coverage: bool,
    },

    /// Run jobs selected by name, tag or job file path
    Run {
        /// Job names, tags or job files
        #[arg(required = true)]
        specs: Vec<String>,

        /// Number of jobs to run at once (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Skip the compile step
        #[arg(long)]
        no_compile: bool,

        /// Compile with debug symbols and runtime checks
        #[arg(short, long)]
        debug: bool,

        /// Compile with code coverage instrumentation
        #[arg(long)]
        coverage: bool,
    },

    /// Show project configuration and library status
    Info,

    /// Remove the output directory
    Clean {
        /// Also remove dependency checkouts
        #[arg(long)]
        dependencies: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, project_dir: &Path, verbosity: Verbosity) -> Result<()> {
        match self {
            Self::Fetch => fetch::execute(project_dir, verbosity).await,
            Self::Compile {
                force,
                debug,
                coverage,
            } => {
                let options = CompileOptions {
                    force,
                    debug,
                    coverage,
                };
                compile::execute(project_dir, verbosity, options).await
            }
            Self::Run {
                specs,
                jobs,
                no_compile,
                debug,
                coverage,
            } => {
                let options = run::RunOptions {
                    specs,
                    jobs,
                    no_compile,
                    compile: CompileOptions {
                        force: false,
                        debug,
                        coverage,
                    },
                };
                run::execute(project_dir, verbosity, options).await
            }
            Self::Info => info::execute(project_dir).await,
            Self::Clean { dependencies } => clean::execute(project_dir, dependencies).await,
        }
    }
}

/// Load and validate the project in `path`
///
/// The root is made absolute so paths handed to workers stay valid from
/// inside their job directories.
pub(crate) fn load_project(path: &Path) -> Result<Project> {
    let root: PathBuf = std::env::current_dir()?
        .join(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    Project::load(&root).with_context(|| format!("Failed to load project in {}", path.display()))
}
