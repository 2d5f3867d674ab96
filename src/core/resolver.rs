//! Dependency resolution
//!
//! Walks the dependency graph breadth-first, materializing each dependency
//! checkout under the project's `dependencies/` directory exactly once.
//!
//! Version conflicts are resolved by discovery order: the first declaration
//! of a name to be dequeued wins and every later declaration of that name is
//! ignored, whatever version it asks for. Declarations closer to the root
//! therefore take priority over deeper ones. The same dedup check absorbs
//! cycles, so no explicit cycle detection is needed.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::manifest::{DependencySpec, Manifest};
use crate::error::ResolverError;
use crate::infra::filesystem;
use crate::infra::git::{GitError, VersionControl};

/// A dependency materialized on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Dependency name
    pub name: String,
    /// Checkout root
    pub local_path: PathBuf,
    /// Repository the checkout was cloned from
    pub repository_url: String,
    /// Reference that won resolution
    pub version_ref: String,
    /// Include files or directories declared by the dependency
    pub include_paths: Vec<PathBuf>,
    /// Source files or directories declared by the dependency
    pub source_paths: Vec<PathBuf>,
}

/// Conditions that make a run non-reproducible without failing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    /// Checkout has uncommitted modifications
    DirtyCheckout { name: String, repository_url: String },
    /// Checkout follows a branch instead of a tag or commit
    UnpinnedReference { name: String, version_ref: String },
    /// An update was due but the checkout is dirty
    SkippedUpdate { name: String, version_ref: String },
}

impl ResolutionWarning {
    /// Dependency the warning is about
    pub fn dependency(&self) -> &str {
        match self {
            Self::DirtyCheckout { name, .. }
            | Self::UnpinnedReference { name, .. }
            | Self::SkippedUpdate { name, .. } => name,
        }
    }
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirtyCheckout {
                name,
                repository_url,
            } => write!(
                f,
                "dependency '{name}' has modified code - the current configuration is not \
                 reproducible; commit the changes upstream at {repository_url}"
            ),
            Self::UnpinnedReference { name, version_ref } => write!(
                f,
                "dependency '{name}' follows branch '{version_ref}' rather than a tag or \
                 commit - the current configuration is not reproducible"
            ),
            Self::SkippedUpdate { name, version_ref } => write!(
                f,
                "dependency '{name}' cannot be updated to '{version_ref}' because it \
                 contains modified code"
            ),
        }
    }
}

/// Outcome of one resolution run
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved dependencies keyed by name
    pub dependencies: BTreeMap<String, ResolvedDependency>,
    /// Names in the order they were resolved
    pub order: Vec<String>,
    /// Non-fatal warnings raised along the way
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// Resolved dependencies in discovery order
    pub fn in_order(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.order.iter().filter_map(|name| self.dependencies.get(name))
    }
}

/// Breadth-first dependency resolver
#[derive(Debug)]
pub struct DependencyResolver<'a, V> {
    vcs: &'a V,
    deps_dir: PathBuf,
}

impl<'a, V: VersionControl> DependencyResolver<'a, V> {
    /// Create a resolver placing checkouts in `deps_dir`
    pub fn new(vcs: &'a V, deps_dir: PathBuf) -> Self {
        Self { vcs, deps_dir }
    }

    /// Resolve the transitive closure of `root`
    pub fn resolve(&self, root: &[DependencySpec]) -> Result<Resolution, ResolverError> {
        let mut resolution = Resolution::default();
        if root.is_empty() {
            return Ok(resolution);
        }

        self.vcs.ensure_available()?;
        filesystem::create_dir_all(&self.deps_dir)?;

        let mut queue: VecDeque<DependencySpec> = root.iter().cloned().collect();

        while let Some(dep) = queue.pop_front() {
            if let Some(winner) = resolution.dependencies.get(&dep.name) {
                if winner.version_ref != dep.version_ref {
                    tracing::debug!(
                        "Ignoring '{}' at '{}', already resolved at '{}'",
                        dep.name,
                        dep.version_ref,
                        winner.version_ref
                    );
                }
                continue;
            }

            let local_path = self.materialize(&dep, &mut resolution.warnings)?;
            let manifest = read_dependency_manifest(&dep, &local_path)?;

            let mut source_paths: Vec<PathBuf> = manifest
                .compile
                .source
                .iter()
                .map(|s| local_path.join(s))
                .collect();
            source_paths.extend(manifest.compile.sources.iter().map(|s| local_path.join(s)));
            let include_paths = manifest
                .compile
                .include
                .iter()
                .map(|s| local_path.join(s))
                .collect();

            queue.extend(manifest.dependencies);

            resolution.order.push(dep.name.clone());
            resolution.dependencies.insert(
                dep.name.clone(),
                ResolvedDependency {
                    name: dep.name,
                    local_path,
                    repository_url: dep.repository_url,
                    version_ref: dep.version_ref,
                    include_paths,
                    source_paths,
                },
            );
        }

        Ok(resolution)
    }

    /// Bring the checkout for `dep` to the requested reference where safe
    fn materialize(
        &self,
        dep: &DependencySpec,
        warnings: &mut Vec<ResolutionWarning>,
    ) -> Result<PathBuf, ResolverError> {
        let path = self.deps_dir.join(&dep.name);

        if path.is_dir() {
            let dirty = self.vcs.is_dirty(&path);

            if self.needs_update(&path, dep)? {
                if dirty {
                    warn(
                        warnings,
                        ResolutionWarning::SkippedUpdate {
                            name: dep.name.clone(),
                            version_ref: dep.version_ref.clone(),
                        },
                    );
                } else {
                    tracing::info!("Updating dependency \"{}\" to {}", dep.name, dep.version_ref);
                    self.vcs.prepare_remote(&dep.repository_url);
                    self.vcs.fetch_remote(&path)?;
                    self.vcs.checkout(&path, &dep.version_ref)?;
                    if !self.vcs.is_detached(&path) {
                        self.vcs.merge_tracked_branch(&path)?;
                    }
                }
            }

            if dirty {
                warn(
                    warnings,
                    ResolutionWarning::DirtyCheckout {
                        name: dep.name.clone(),
                        repository_url: dep.repository_url.clone(),
                    },
                );
            }
        } else {
            tracing::info!("Fetching dependency \"{}\" ({})", dep.name, dep.version_ref);
            self.vcs.prepare_remote(&dep.repository_url);
            self.vcs.clone_repo(&dep.repository_url, &path)?;
            self.vcs.checkout(&path, &dep.version_ref)?;
        }

        if !self.vcs.is_detached(&path) {
            warn(
                warnings,
                ResolutionWarning::UnpinnedReference {
                    name: dep.name.clone(),
                    version_ref: dep.version_ref.clone(),
                },
            );
        }

        if let Ok(commit) = self.vcs.current_commit(&path) {
            tracing::debug!("Dependency {} is at commit {commit}", dep.name);
        }

        Ok(path)
    }

    /// Whether an existing checkout differs from the requested reference
    ///
    /// A checkout on a branch always needs an update so upstream commits are
    /// picked up. A pinned checkout needs one unless its tag or commit is the
    /// requested reference, or the reference peels to the current commit.
    fn needs_update(&self, path: &Path, dep: &DependencySpec) -> Result<bool, GitError> {
        if !self.vcs.is_detached(path) {
            return Ok(true);
        }

        let head = self.vcs.current_commit(path)?;
        let current = self.vcs.resolve_tag(path).unwrap_or_else(|| head.clone());
        if current == dep.version_ref || head == dep.version_ref {
            return Ok(false);
        }

        Ok(self.vcs.resolve_ref(path, &dep.version_ref).as_deref() != Some(head.as_str()))
    }
}

fn warn(warnings: &mut Vec<ResolutionWarning>, warning: ResolutionWarning) {
    tracing::warn!("(!) {warning}");
    warnings.push(warning);
}

fn read_dependency_manifest(
    dep: &DependencySpec,
    local_path: &Path,
) -> Result<Manifest, ResolverError> {
    let manifest = Manifest::load(&local_path.join(defaults::MANIFEST_FILE)).map_err(|source| {
        ResolverError::Manifest {
            name: dep.name.clone(),
            source,
        }
    })?;

    if manifest.project.name != dep.name {
        return Err(ResolverError::ManifestMismatch {
            expected: dep.name.clone(),
            found: manifest.project.name,
            path: local_path.to_path_buf(),
        });
    }

    Ok(manifest)
}
