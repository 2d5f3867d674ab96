//! Infrastructure layer
//!
//! Handles I/O with the outside world: the filesystem, git, and the
//! credential agent.

pub mod dirs;
pub mod filesystem;
pub mod git;
pub mod ssh_agent;
