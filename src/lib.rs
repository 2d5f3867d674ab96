//! orca - dependency fetching, cached library builds and supervised solver runs
//!
//! A project declares, in `orca.toml`, a user library compiled from its own
//! sources plus sources pulled from sibling projects in git, and a set of
//! jobs run by an external solver that loads that library.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Resolution, build caching and job orchestration
//! - [`infra`] - Infrastructure layer (filesystem, git, ssh-agent)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
