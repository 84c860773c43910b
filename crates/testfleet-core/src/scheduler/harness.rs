//! Task-local harness configuration files and command assembly.
//!
//! The harness is an external executable; its contract is a JSON config
//! file (camelCase keys, matching what the harness parses) plus a small
//! set of mode flags. One config file is written per task attempt set,
//! next to the task's result file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{CoverageFormat, RunOptions};
use crate::error::Result;
use crate::scheduler::process::HarnessCommand;
use crate::scheduler::task::{TaskKind, TestTask};

/// Contents of the per-task harness config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    /// Directory the harness resolves test modules against.
    pub root: PathBuf,
    /// Module names to execute.
    pub tests: Vec<String>,
    /// Where the harness writes its suite/case result file.
    pub report: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub html_coverage_report: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub json_coverage_report: Option<PathBuf>,
    pub ignore_leaks: bool,
}

impl HarnessConfig {
    pub fn for_task(task: &TestTask, root: &Path, report: &Path, options: &RunOptions) -> Self {
        let coverage_dir = report.parent().map(|p| p.join("coverage"));
        let stem = format!("{}_{}", task.key, task.kind.suffix());
        let (html, json) = match (options.coverage, coverage_dir) {
            (Some(CoverageFormat::Html), Some(dir)) => {
                (Some(dir.join(format!("{stem}.html"))), None)
            }
            (Some(CoverageFormat::Json), Some(dir)) => {
                (None, Some(dir.join(format!("{stem}.json"))))
            }
            _ => (None, None),
        };
        Self {
            root: root.to_path_buf(),
            tests: task.modules.clone(),
            report: report.to_path_buf(),
            port: task.port,
            html_coverage_report: html,
            json_coverage_report: json,
            // Browser suites share one page; leaked globals between suites
            // are expected there, not in isolated headless runs.
            ignore_leaks: matches!(task.kind, TaskKind::BrowserHosted),
        }
    }

    /// Write the config next to the task's result file and return its path.
    pub fn write(&self, dir: &Path, task: &TestTask) -> Result<PathBuf> {
        let path = dir.join(format!("{}_{}.config.json", task.key, task.kind.suffix()));
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text)?;
        Ok(path)
    }
}

/// Assemble the harness invocation for one attempt.
///
/// `base` is the configured launcher (program plus fixed leading
/// arguments); the mode flags and config path are appended. Interactive
/// server mode serves forever and writes no report, so it gets neither a
/// report flag nor a deadline.
pub fn harness_command(
    base: &[String],
    kind: TaskKind,
    config_path: &Path,
    server_mode: bool,
    deadline: Option<Duration>,
) -> HarnessCommand {
    let mut args: Vec<String> = base.iter().skip(1).cloned().collect();
    match kind {
        TaskKind::Headless => args.push("--isolated".to_string()),
        TaskKind::BrowserHosted if server_mode => args.push("--serve".to_string()),
        TaskKind::BrowserHosted => args.push("--browser".to_string()),
    }
    if !server_mode {
        args.push("--report".to_string());
    }
    args.push(format!("--config={}", config_path.display()));

    HarnessCommand {
        program: base.first().cloned().unwrap_or_default(),
        args,
        current_dir: None,
        deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_task() -> TestTask {
        let mut task = TestTask::new(
            "widgets",
            TaskKind::BrowserHosted,
            vec!["widgets".to_string(), "widgets-demo".to_string()],
        );
        task.port = Some(41_200);
        task
    }

    #[test]
    fn test_config_carries_port_and_modules() {
        let task = browser_task();
        let config = HarnessConfig::for_task(
            &task,
            Path::new("/src/ui-kit"),
            Path::new("/artifacts/run-1/widgets_browser.xml"),
            &RunOptions::default(),
        );
        assert_eq!(config.port, Some(41_200));
        assert_eq!(config.tests.len(), 2);
        assert!(config.ignore_leaks);
        assert!(config.html_coverage_report.is_none());
    }

    #[test]
    fn test_coverage_paths_follow_selected_format() {
        let task = browser_task();
        let options = RunOptions {
            coverage: Some(CoverageFormat::Html),
            ..RunOptions::default()
        };
        let config = HarnessConfig::for_task(
            &task,
            Path::new("/src/ui-kit"),
            Path::new("/artifacts/run-1/widgets_browser.xml"),
            &options,
        );
        assert_eq!(
            config.html_coverage_report,
            Some(PathBuf::from("/artifacts/run-1/coverage/widgets_browser.html"))
        );
        assert!(config.json_coverage_report.is_none());
    }

    #[test]
    fn test_config_file_uses_harness_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let task = browser_task();
        let config = HarnessConfig::for_task(
            &task,
            Path::new("/src/ui-kit"),
            &dir.path().join("widgets_browser.xml"),
            &RunOptions::default(),
        );

        let path = config.write(dir.path(), &task).unwrap();
        assert!(path.ends_with("widgets_browser.config.json"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"ignoreLeaks\""));
        assert!(text.contains("\"tests\""));
        assert!(!text.contains("\"htmlCoverageReport\""), "unset fields stay out");
    }

    #[test]
    fn test_headless_command_is_isolated_and_reporting() {
        let base = vec!["unit-harness".to_string(), "--color".to_string()];
        let command = harness_command(
            &base,
            TaskKind::Headless,
            Path::new("/tmp/widgets_headless.config.json"),
            false,
            Some(Duration::from_secs(600)),
        );
        assert_eq!(command.program, "unit-harness");
        assert_eq!(
            command.args,
            vec![
                "--color".to_string(),
                "--isolated".to_string(),
                "--report".to_string(),
                "--config=/tmp/widgets_headless.config.json".to_string(),
            ]
        );
        assert!(command.deadline.is_some());
    }

    #[test]
    fn test_server_mode_serves_without_report() {
        let base = vec!["unit-harness".to_string()];
        let command = harness_command(
            &base,
            TaskKind::BrowserHosted,
            Path::new("/tmp/widgets_browser.config.json"),
            true,
            None,
        );
        assert!(command.args.contains(&"--serve".to_string()));
        assert!(!command.args.contains(&"--report".to_string()));
        assert!(command.deadline.is_none());
    }

    #[test]
    fn test_browser_command_reports() {
        let base = vec!["unit-harness".to_string()];
        let command = harness_command(
            &base,
            TaskKind::BrowserHosted,
            Path::new("/tmp/widgets_browser.config.json"),
            false,
            None,
        );
        assert!(command.args.contains(&"--browser".to_string()));
        assert!(command.args.contains(&"--report".to_string()));
    }
}
