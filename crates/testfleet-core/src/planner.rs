//! Campaign planning: scope flags plus graph closures, resolved into the
//! ordered list of module keys to schedule.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::config::RunScope;
use crate::error::{FleetError, Result};
use crate::graph::ModuleGraph;

/// Build-once plan over a frozen graph.
///
/// The plan is computed lazily on first access and cached on the instance;
/// a new run builds a new planner, so there is no process-wide state to
/// invalidate.
pub struct TestPlanner {
    graph: Arc<ModuleGraph>,
    scope: RunScope,
    plan: OnceLock<Vec<String>>,
}

impl TestPlanner {
    /// Entry-point names are validated here, so that [`TestPlanner::plan`]
    /// itself cannot fail.
    pub fn new(graph: Arc<ModuleGraph>, scope: RunScope) -> Result<Self> {
        if let RunScope::EntryModules(entries) = &scope {
            for entry in entries {
                if !graph.contains(entry) {
                    return Err(FleetError::UnknownEntryModule {
                        module: entry.clone(),
                    });
                }
            }
        }
        Ok(Self {
            graph,
            scope,
            plan: OnceLock::new(),
        })
    }

    /// The de-duplicated, order-preserving module keys to schedule.
    pub fn plan(&self) -> &[String] {
        self.plan.get_or_init(|| self.compute())
    }

    fn compute(&self) -> Vec<String> {
        let raw = match &self.scope {
            RunScope::EntryModules(entries) => self.graph.child_modules(entries),
            RunScope::Only(repositories) => {
                let mut plan = Vec::new();
                for repository in repositories {
                    plan.extend(self.test_module_names(repository));
                }
                plan
            }
            RunScope::Repositories(repositories) => self.expand_repositories(repositories),
            RunScope::All => self
                .graph
                .all_test_modules()
                .into_iter()
                .map(|m| m.name.clone())
                .collect(),
        };
        let plan = dedup_preserving(raw);
        info!(event = "plan.computed", modules = plan.len());
        plan
    }

    /// Named-repository expansion: the repository's own test modules, plus
    /// the test modules of every repository owning a member of the reverse
    /// dependency closure. Dependents are re-tested at repository
    /// granularity, not module granularity.
    fn expand_repositories(&self, repositories: &[String]) -> Vec<String> {
        let mut plan = Vec::new();
        for repository in repositories {
            plan.extend(self.test_module_names(repository));

            let seed: Vec<String> = self
                .graph
                .modules_of_repository(repository)
                .into_iter()
                .map(|m| m.name.clone())
                .collect();
            let mut owners_seen = HashSet::new();
            for member in self.graph.parent_modules(&seed) {
                let Some(owner) = self.graph.get(&member).map(|m| m.repository.clone()) else {
                    continue;
                };
                if owners_seen.insert(owner.clone()) {
                    plan.extend(self.test_module_names(&owner));
                }
            }
        }
        plan
    }

    fn test_module_names(&self, repository: &str) -> Vec<String> {
        self.graph
            .test_modules_of_repository(repository)
            .into_iter()
            .map(|m| m.name.clone())
            .collect()
    }
}

fn dedup_preserving(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
