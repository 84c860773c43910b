//! Module dependency graph: per-module metadata, edge closures, and the
//! curated cycle-override step.
//!
//! The graph is built once per run from scanned descriptors and is
//! read-only afterwards, so it can be shared freely across concurrent
//! scheduler workers. Closure traversal treats dependency names the scan
//! never discovered as leaves rather than errors; only explicit entry
//! points are validated (by the planner).

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::config::CycleOverride;
use crate::descriptor::Module;

/// Frozen-after-build module graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: HashMap<String, Module>,
    /// Names in first-registration order, for deterministic iteration.
    order: Vec<String>,
    /// Duplicate-name warnings recorded during the last build.
    warnings: Vec<String>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the graph from scanned modules and merge the cycle-override
    /// table, exactly once.
    ///
    /// Idempotent across builds: a name already present from an earlier
    /// build is not re-added unless `force` clears the graph first. Two
    /// descriptors declaring the same name within one scan resolve
    /// last-write-wins, with a warning recorded on the graph.
    pub fn build(&mut self, scanned: Vec<Module>, overrides: &[CycleOverride], force: bool) {
        if force {
            self.modules.clear();
            self.order.clear();
        }
        self.warnings.clear();

        let mut seen_this_scan: HashSet<String> = HashSet::new();
        for module in scanned {
            if !seen_this_scan.insert(module.name.clone()) {
                let message = format!(
                    "duplicate module name '{}' declared at {}; keeping the later descriptor",
                    module.name,
                    module.path.display()
                );
                warn!(
                    event = "graph.duplicate_module",
                    module = %module.name,
                    repository = %module.repository,
                );
                self.warnings.push(message);
                self.modules.insert(module.name.clone(), module);
                continue;
            }
            if self.modules.contains_key(&module.name) {
                // Present from a previous build; rebuilds do not re-add.
                continue;
            }
            self.order.push(module.name.clone());
            self.modules.insert(module.name.clone(), module);
        }

        self.apply_cycle_overrides(overrides);
    }

    /// Merge curated extra dependency edges for relationships the
    /// descriptor format cannot declare without forming a real cycle.
    /// Insertion is set-semantic, so rebuilding over an identical snapshot
    /// cannot stack duplicate edges.
    fn apply_cycle_overrides(&mut self, overrides: &[CycleOverride]) {
        for entry in overrides {
            let Some(module) = self.modules.get_mut(&entry.module) else {
                warn!(event = "graph.override_unknown_module", module = %entry.module);
                continue;
            };
            for dep in &entry.depends {
                if !module.depends_on.iter().any(|d| d == dep) {
                    module.depends_on.push(dep.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Duplicate-name warnings from the last build.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// All module names in first-registration order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn modules_of_repository(&self, repository: &str) -> Vec<&Module> {
        self.order
            .iter()
            .filter_map(|name| self.modules.get(name))
            .filter(|m| m.repository == repository)
            .collect()
    }

    pub fn test_modules_of_repository(&self, repository: &str) -> Vec<&Module> {
        self.modules_of_repository(repository)
            .into_iter()
            .filter(|m| m.has_unit_test)
            .collect()
    }

    pub fn all_test_modules(&self) -> Vec<&Module> {
        self.order
            .iter()
            .filter_map(|name| self.modules.get(name))
            .filter(|m| m.has_unit_test)
            .collect()
    }

    /// Forward dependency closure of `seed`: each seed member followed by
    /// its transitive dependencies in first-seen depth-first order.
    ///
    /// A per-call visited set terminates traversal when declarations form a
    /// cycle; this is defensive termination, not cycle detection. Unknown
    /// names are skipped.
    pub fn child_modules(&self, seed: &[String]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        self.collect_children(seed, &mut visited, &mut result);
        result
    }

    fn collect_children(
        &self,
        names: &[String],
        visited: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) {
        for name in names {
            let Some(module) = self.modules.get(name) else {
                continue;
            };
            if !visited.insert(name.clone()) {
                continue;
            }
            out.push(name.clone());
            self.collect_children(&module.depends_on, visited, out);
        }
    }

    /// Reverse dependency closure of `seed`, computed by fixed-point
    /// iteration: keep scanning all modules, adding any whose declared
    /// dependencies intersect the result, until a full pass adds nothing.
    /// The result includes the (known) seed members themselves.
    pub fn parent_modules(&self, seed: &[String]) -> Vec<String> {
        let mut members: HashSet<String> = HashSet::new();
        let mut result: Vec<String> = Vec::new();
        for name in seed {
            if self.modules.contains_key(name) && members.insert(name.clone()) {
                result.push(name.clone());
            }
        }

        loop {
            let mut added = false;
            for name in &self.order {
                if members.contains(name) {
                    continue;
                }
                let Some(module) = self.modules.get(name) else {
                    continue;
                };
                if module.depends_on.iter().any(|d| members.contains(d)) {
                    members.insert(name.clone());
                    result.push(name.clone());
                    added = true;
                }
            }
            if !added {
                break;
            }
        }

        result
    }
}
