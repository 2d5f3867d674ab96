//! Configuration and constants
//!
//! - [`defaults`] - Default values and well-known file names

pub mod defaults;
