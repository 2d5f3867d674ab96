//! CLI implementation for `orca clean` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::status;
use crate::infra::filesystem;

/// Execute the clean command
pub async fn execute(path: &Path, dependencies: bool) -> Result<()> {
    let project = super::load_project(path)?;

    let mut targets = vec![project.output_dir()];
    if dependencies {
        targets.push(project.dependencies_dir());
    }

    let mut removed = Vec::new();
    for dir in targets.into_iter().filter(|dir| dir.exists()) {
        filesystem::remove_dir_all(&dir)
            .with_context(|| format!("Failed to clean {}", dir.display()))?;
        removed.push(dir);
    }

    if removed.is_empty() {
        println!("{} Nothing to clean", status::SUCCESS);
    } else {
        println!("{} Cleaned:", status::SUCCESS);
        for dir in &removed {
            let shown = dir.strip_prefix(&project.root).unwrap_or(dir);
            println!("  Removed {}/", shown.display());
        }
    }

    Ok(())
}
