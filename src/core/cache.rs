//! Build cache for the compiled library
//!
//! A SHA-256 digest over every compile input decides whether the library
//! must be rebuilt. The digest of the last successful (or in-flight) compile
//! is kept next to the artifacts in the library directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::defaults;
use crate::core::resolver::ResolvedDependency;
use crate::error::CacheError;
use crate::infra::filesystem;

/// Compile inputs contributed by one dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInputs {
    /// Dependency name, used for ordering
    pub name: String,
    /// Include files or directories
    pub includes: Vec<PathBuf>,
    /// Source files or directories
    pub sources: Vec<PathBuf>,
}

impl From<&ResolvedDependency> for DependencyInputs {
    fn from(dep: &ResolvedDependency) -> Self {
        Self {
            name: dep.name.clone(),
            includes: dep.include_paths.clone(),
            sources: dep.source_paths.clone(),
        }
    }
}

/// Every file that feeds the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileInputs {
    /// Primary source file
    pub primary: Option<PathBuf>,
    /// Project include files or directories
    pub includes: Vec<PathBuf>,
    /// Project auxiliary sources
    pub sources: Vec<PathBuf>,
    /// Dependency inputs, in any order
    pub dependencies: Vec<DependencyInputs>,
}

impl CompileInputs {
    /// Input files in digest order, directories expanded
    ///
    /// Order: primary, includes, sources, then each dependency (sorted by
    /// name) with its includes before its sources.
    pub fn files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dependencies: Vec<&DependencyInputs> = self.dependencies.iter().collect();
        dependencies.sort_by(|a, b| a.name.cmp(&b.name));

        let roots = self
            .primary
            .iter()
            .chain(&self.includes)
            .chain(&self.sources)
            .chain(
                dependencies
                    .into_iter()
                    .flat_map(|dep| dep.includes.iter().chain(&dep.sources)),
            );

        let mut files = Vec::new();
        for root in roots {
            expand(root, &mut files)?;
        }
        Ok(files)
    }
}

fn expand(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), CacheError> {
    if !path.is_dir() {
        files.push(path.to_path_buf());
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| CacheError::ReadInput {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(())
}

/// Digest over the inputs, configuration and flags, as lowercase hex
pub fn compute_digest<C: Serialize + ?Sized>(
    inputs: &CompileInputs,
    config: &C,
    flags: &[String],
) -> Result<String, CacheError> {
    let mut hasher = Sha256::new();

    for file in inputs.files()? {
        let content = std::fs::read(&file).map_err(|e| CacheError::ReadInput {
            path: file.clone(),
            error: e.to_string(),
        })?;
        // Frame each file so moved bytes between files change the digest
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        hasher.update(name.as_bytes());
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }

    let config = serde_json::to_vec(config).map_err(|e| CacheError::Serialize(e.to_string()))?;
    hasher.update(&config);
    let flags = serde_json::to_vec(flags).map_err(|e| CacheError::Serialize(e.to_string()))?;
    hasher.update(&flags);

    Ok(hex::encode(hasher.finalize()))
}

/// Digest-gated rebuild decisions for one library directory
#[derive(Debug, Clone)]
pub struct BuildCache {
    lib_dir: PathBuf,
}

impl BuildCache {
    /// Cache for the library built in `lib_dir`
    pub fn new(lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
        }
    }

    /// Library directory
    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }

    /// Location of the persisted digest
    pub fn digest_path(&self) -> PathBuf {
        self.lib_dir.join(defaults::DIGEST_FILE)
    }

    /// Digest recorded by the last compile, if any
    pub fn stored_digest(&self) -> Option<String> {
        filesystem::read_file(&self.digest_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Whether the library directory holds a compiled library
    pub fn has_artifacts(&self) -> bool {
        let Ok(entries) = std::fs::read_dir(&self.lib_dir) else {
            return false;
        };
        entries.filter_map(Result::ok).any(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| defaults::ARTIFACT_EXTENSIONS.contains(&ext))
        })
    }

    /// Decide whether the library must be rebuilt
    ///
    /// Returns `true` when no artifacts exist, no digest was recorded, or the
    /// recorded digest differs. On `true` the new digest is persisted before
    /// returning; callers that then fail to compile must call
    /// [`BuildCache::invalidate`].
    pub fn needs_rebuild<C: Serialize + ?Sized>(
        &self,
        inputs: &CompileInputs,
        config: &C,
        flags: &[String],
    ) -> Result<bool, CacheError> {
        let digest = compute_digest(inputs, config, flags)?;

        let rebuild = if !self.has_artifacts() {
            tracing::debug!("No compiled library in {}", self.lib_dir.display());
            true
        } else {
            match self.stored_digest() {
                Some(stored) if stored == digest => false,
                Some(_) => {
                    tracing::debug!("Compile inputs changed");
                    true
                }
                None => true,
            }
        };

        if rebuild {
            filesystem::write_file_atomic(&self.digest_path(), &digest).map_err(|e| {
                CacheError::Persist {
                    path: self.digest_path(),
                    error: e.to_string(),
                }
            })?;
        }

        Ok(rebuild)
    }

    /// Forget the recorded digest so the next check rebuilds
    pub fn invalidate(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(self.digest_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Persist {
                path: self.digest_path(),
                error: e.to_string(),
            }),
        }
    }
}
