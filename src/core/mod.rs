//! Core logic
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (orca.toml) parsing and validation
//! - [`resolver`] - Breadth-first dependency resolution
//! - [`cache`] - Digest-gated rebuild decisions
//! - [`compile`] - Library compile step
//! - [`selection`] - Job selection from command-line specs
//! - [`job`] - Worker job lifecycle and job records
//! - [`orchestrator`] - Bounded, interruptible job execution
//! - [`context`] - Per-run context

pub mod cache;
pub mod compile;
pub mod context;
pub mod job;
pub mod manifest;
pub mod orchestrator;
pub mod resolver;
pub mod selection;
