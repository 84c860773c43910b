//! Campaign configuration: repositories under test, run-mode options, and
//! the curated cycle-override table.
//!
//! [`FleetConfig`] is the durable, file-backed side (which repositories
//! exist, where artifacts go); [`RunOptions`] is the per-invocation side
//! (scope, toggles, ceilings) assembled by the CLI and consumed by the core
//! as plain data.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Which modules seed the campaign plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    /// Every test-bearing module of every repository.
    All,
    /// Named repositories, expanded through the reverse dependency closure.
    Repositories(Vec<String>),
    /// Named repositories only — no dependent expansion.
    Only(Vec<String>),
    /// Explicit entry modules, expanded through the forward closure.
    EntryModules(Vec<String>),
}

impl Default for RunScope {
    fn default() -> Self {
        RunScope::All
    }
}

/// Coverage artifact format requested from the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageFormat {
    Html,
    Json,
}

/// Which harness kinds a run may spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    #[default]
    Both,
    HeadlessOnly,
    BrowserOnly,
}

/// Per-invocation run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub scope: RunScope,
    /// Shrink the plan to modules touched since each repository's baseline.
    pub diff_mode: bool,
    pub kinds: KindFilter,
    /// Serve browser harnesses interactively instead of reporting.
    pub server_mode: bool,
    pub coverage: Option<CoverageFormat>,
    /// Worker-pool ceiling: how many tasks may run at once.
    pub concurrency: usize,
    /// Wall-clock deadline for headless tasks, in seconds.
    pub headless_timeout_secs: u64,
    /// Total attempts allowed for a browser task before a flaky failure
    /// becomes terminal.
    pub max_attempts: u32,
    /// Ports offered to browser harnesses before falling back to random
    /// probing.
    pub preferred_ports: Vec<u16>,
    /// Record newly seen harness errors into the allowed-errors baseline
    /// instead of reporting them.
    pub update_error_baseline: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            scope: RunScope::All,
            diff_mode: false,
            kinds: KindFilter::Both,
            server_mode: false,
            coverage: None,
            concurrency: 4,
            headless_timeout_secs: 600,
            max_attempts: 3,
            preferred_ports: Vec::new(),
            update_error_baseline: false,
        }
    }
}

/// One repository participating in the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    /// Checkout location; module descriptors are scanned beneath it.
    pub path: PathBuf,
    /// Revision or branch changed paths are computed against.
    #[serde(default = "default_baseline")]
    pub baseline: String,
    /// Whether this repository's unit tests may run browser-hosted.
    #[serde(default)]
    pub unit_in_browser: bool,
}

impl RepositoryConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            baseline: default_baseline(),
            unit_in_browser: false,
        }
    }

    pub fn with_browser_tests(mut self) -> Self {
        self.unit_in_browser = true;
        self
    }
}

fn default_baseline() -> String {
    "origin/main".to_string()
}

/// A curated extra dependency edge the descriptor format cannot declare
/// without forming a real cycle. Applied once after every graph build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOverride {
    pub module: String,
    pub depends: Vec<String>,
}

/// Run-option defaults carried in the campaign config file. CLI flags
/// override them per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub concurrency: usize,
    pub headless_timeout_secs: u64,
    pub max_attempts: u32,
    pub preferred_ports: Vec<u16>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            concurrency: 4,
            headless_timeout_secs: 600,
            max_attempts: 3,
            preferred_ports: Vec::new(),
        }
    }
}

/// Campaign-wide configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub cycle_overrides: Vec<CycleOverride>,
    /// Parent directory for per-run report directories.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Allowed-errors baseline location.
    #[serde(default = "default_error_baseline")]
    pub error_baseline: PathBuf,
    /// Harness launcher; per-task arguments are appended to it.
    #[serde(default = "default_harness_command")]
    pub harness_command: Vec<String>,
    #[serde(default)]
    pub defaults: RunDefaults,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_error_baseline() -> PathBuf {
    PathBuf::from("allowed-errors.json")
}

fn default_harness_command() -> Vec<String> {
    vec!["unit-harness".to_string()]
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FleetError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config: FleetConfig = serde_json::from_str(&text).map_err(|e| FleetError::Config {
            reason: format!("cannot parse {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.harness_command.is_empty() {
            return Err(FleetError::Config {
                reason: "harness_command must name an executable".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if !seen.insert(repo.name.as_str()) {
                return Err(FleetError::Config {
                    reason: format!("repository '{}' is configured twice", repo.name),
                });
            }
        }
        Ok(())
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_defaults_are_sane() {
        let options = RunOptions::default();
        assert_eq!(options.scope, RunScope::All);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.max_attempts, 3);
        assert!(!options.diff_mode);
    }

    #[test]
    fn test_config_parses_with_defaults() {
        let json = r#"{
            "repositories": [
                { "name": "ui-kit", "path": "/src/ui-kit", "unit_in_browser": true },
                { "name": "platform", "path": "/src/platform" }
            ]
        }"#;
        let config: FleetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.repositories.len(), 2);
        assert_eq!(config.repositories[0].baseline, "origin/main");
        assert!(config.repositories[0].unit_in_browser);
        assert!(!config.repositories[1].unit_in_browser);
        assert_eq!(config.report_dir, PathBuf::from("artifacts"));
        assert_eq!(config.harness_command, vec!["unit-harness".to_string()]);
        assert_eq!(config.defaults, RunDefaults::default());
    }

    #[test]
    fn test_config_defaults_table_overrides_piecewise() {
        let json = r#"{
            "repositories": [],
            "defaults": { "concurrency": 2, "preferred_ports": [41000, 41001] }
        }"#;
        let config: FleetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.defaults.concurrency, 2);
        assert_eq!(config.defaults.preferred_ports, vec![41000, 41001]);
        assert_eq!(config.defaults.max_attempts, 3);
        assert_eq!(config.defaults.headless_timeout_secs, 600);
    }

    #[test]
    fn test_validate_rejects_duplicate_repositories() {
        let config = FleetConfig {
            repositories: vec![
                RepositoryConfig::new("ui-kit", "/a"),
                RepositoryConfig::new("ui-kit", "/b"),
            ],
            cycle_overrides: Vec::new(),
            report_dir: default_report_dir(),
            error_baseline: default_error_baseline(),
            harness_command: default_harness_command(),
            defaults: RunDefaults::default(),
        };
        assert!(matches!(
            config.validate(),
            Err(FleetError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_harness_command() {
        let config = FleetConfig {
            repositories: Vec::new(),
            cycle_overrides: Vec::new(),
            report_dir: default_report_dir(),
            error_baseline: default_error_baseline(),
            harness_command: Vec::new(),
            defaults: RunDefaults::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_options_serde_roundtrip() {
        let options = RunOptions {
            scope: RunScope::Repositories(vec!["ui-kit".to_string()]),
            diff_mode: true,
            concurrency: 2,
            ..RunOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: RunOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scope, options.scope);
        assert!(back.diff_mode);
        assert_eq!(back.concurrency, 2);
    }
}
