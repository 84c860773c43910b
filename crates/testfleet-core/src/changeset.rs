//! Changed-path resolution against each repository's merge baseline.
//!
//! Diff collection is best-effort by design: a repository whose diff
//! cannot be produced (missing baseline ref, shallow clone, not a git
//! checkout at all) degrades to "test everything in it" rather than
//! failing the run. Skipping work is an optimization and must never be
//! the reason a run aborts.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::descriptor::Module;
use crate::error::{FleetError, Result};
use crate::obs;

/// Ceiling on concurrently running diff subprocesses.
const DIFF_CONCURRENCY: usize = 2;

/// Source of changed paths for one repository.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    /// Paths changed relative to the repository's baseline ref, relative to
    /// the repository root.
    async fn changed_paths(&self, repository: &RepositoryConfig) -> Result<Vec<String>>;
}

/// [`DiffProvider`] backed by `git diff --name-only <baseline>`.
#[derive(Debug, Default, Clone)]
pub struct GitDiff;

#[async_trait]
impl DiffProvider for GitDiff {
    async fn changed_paths(&self, repository: &RepositoryConfig) -> Result<Vec<String>> {
        let output = tokio::process::Command::new("git")
            .args(["diff", "--name-only", &repository.baseline])
            .current_dir(&repository.path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| FleetError::Changeset {
                repository: repository.name.clone(),
                reason: format!("failed to spawn git: {e}"),
            })?;

        if !output.status.success() {
            return Err(FleetError::Changeset {
                repository: repository.name.clone(),
                reason: format!(
                    "git diff against '{}' exited with {}: {}",
                    repository.baseline,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let paths = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(paths)
    }
}

/// Per-repository changed-path sets, consulted by the scheduler to skip
/// modules no change could have affected.
#[derive(Debug, Default)]
pub struct ChangeSetResolver {
    active: bool,
    changesets: HashMap<String, Vec<String>>,
}

impl ChangeSetResolver {
    /// Resolver that answers "test it" for every module.
    pub fn inactive() -> Self {
        Self {
            active: false,
            changesets: HashMap::new(),
        }
    }

    /// Collect changed paths for every repository, at most
    /// [`DIFF_CONCURRENCY`] diffs in flight. A failed repository is logged
    /// and left out of the map, which makes all of its modules eligible.
    pub async fn resolve(
        provider: &dyn DiffProvider,
        repositories: &[RepositoryConfig],
    ) -> Self {
        let results: Vec<(String, Result<Vec<String>>)> = stream::iter(repositories)
            .map(|repository| async move {
                let paths = provider.changed_paths(repository).await;
                (repository.name.clone(), paths)
            })
            .buffer_unordered(DIFF_CONCURRENCY)
            .collect()
            .await;

        let mut changesets = HashMap::new();
        for (name, result) in results {
            match result {
                Ok(paths) => {
                    debug!(
                        event = "changeset.resolved",
                        repository = %name,
                        changed_paths = paths.len(),
                    );
                    changesets.insert(name, paths);
                }
                Err(error) => {
                    obs::emit_changeset_degraded(&name, &error);
                }
            }
        }
        info!(
            event = "changeset.ready",
            repositories = repositories.len(),
            resolved = changesets.len(),
        );

        Self {
            active: true,
            changesets,
        }
    }

    /// Whether `module` should run based on its repository's changeset.
    ///
    /// A module matches when some changed path's leading directory segment
    /// equals the module's directory name. Repositories without a resolved
    /// changeset (diff failed, or resolver inactive) always match.
    pub fn should_test_module(&self, module: &Module) -> bool {
        if !self.active {
            return true;
        }
        let Some(paths) = self.changesets.get(&module.repository) else {
            return true;
        };
        let dir = module.dir_name();
        paths
            .iter()
            .any(|path| path.split('/').next() == Some(dir.as_str()))
    }
}
