//! Platform-specific directory management
//!
//! orca keeps per-user state (the credential agent cache) in the platform
//! cache directory. `ORCA_CACHE_DIR` overrides the default location.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "ORCA_CACHE_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "orca";

/// File holding the cached ssh-agent connection
const AGENT_CACHE_FILE: &str = "ssh-agent.json";

/// Platform-specific directory provider
#[derive(Debug, Clone)]
pub struct OrcaDirs {
    cache_dir: PathBuf,
}

impl OrcaDirs {
    /// Resolve directories from the environment, then platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
        }
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/orca` or `~/.cache/orca`
    /// - macOS: `~/Library/Caches/orca`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Location of the cached credential agent record
    #[must_use]
    pub fn agent_cache_path(&self) -> PathBuf {
        self.cache_dir.join(AGENT_CACHE_FILE)
    }

    fn resolve_cache_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CACHE_DIR) {
            return PathBuf::from(path);
        }

        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".cache").join(APP_NAME))
            })
    }
}

impl Default for OrcaDirs {
    fn default() -> Self {
        Self::new()
    }
}
