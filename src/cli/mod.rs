//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::core::context::Verbosity;
use commands::Commands;

/// orca - fetch dependencies, build the user library, run solver jobs
///
/// Jobs, dependencies and the library are declared in `orca.toml`.
#[derive(Parser, Debug)]
#[command(name = "orca")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for commands run, -vv for everything)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory containing orca.toml
    #[arg(short = 'C', long, global = true, default_value = ".", env = "ORCA_PROJECT_DIR")]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Verbosity requested by `-v` and `-q`
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let verbosity = self.verbosity();
        if let Some(cmd) = self.command {
            cmd.run(&self.project_dir, verbosity).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::parse_from(["orca", "-vv", "-C", "/work/model", "run", "smoke", "plate", "-j", "2"]);
        assert_eq!(cli.verbosity(), Verbosity::Trace);
        assert_eq!(cli.project_dir, PathBuf::from("/work/model"));
        match cli.command {
            Some(Commands::Run { specs, jobs, no_compile, .. }) => {
                assert_eq!(specs, ["smoke", "plate"]);
                assert_eq!(jobs, Some(2));
                assert!(!no_compile);
            }
            other => panic!("Expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_a_spec() {
        assert!(Cli::try_parse_from(["orca", "run"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
