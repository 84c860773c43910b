//! Task identity and lifecycle state.

use serde::{Deserialize, Serialize};

/// Harness execution kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Headless,
    BrowserHosted,
}

impl TaskKind {
    /// File-name suffix distinguishing the two result files a module key
    /// may produce.
    pub fn suffix(&self) -> &'static str {
        match self {
            TaskKind::Headless => "headless",
            TaskKind::BrowserHosted => "browser",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Task lifecycle: `Pending → Running → {Passed, Failed, Timeout, Skipped}`,
/// with `Running → Running` on flake retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running { attempt: u32 },
    Passed,
    Failed,
    Timeout,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Passed | TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Skipped
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running { .. } => "running",
            TaskStatus::Passed => "passed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Skipped => "skipped",
        }
    }
}

/// One scheduled unit of work: a (key, kind) pair with the modules the
/// harness should execute. Exactly one task exists per pair per run.
#[derive(Debug, Clone)]
pub struct TestTask {
    /// Module key the task was planned under.
    pub key: String,
    pub kind: TaskKind,
    /// Module names handed to the harness.
    pub modules: Vec<String>,
    /// Claimed port, browser-hosted tasks only.
    pub port: Option<u16>,
    /// Attempts started so far, including the current one.
    pub attempts: u32,
    pub status: TaskStatus,
}

impl TestTask {
    pub fn new(key: impl Into<String>, kind: TaskKind, modules: Vec<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            modules,
            port: None,
            attempts: 0,
            status: TaskStatus::Pending,
        }
    }

    /// Transition into `Running`, counting the new attempt.
    pub fn start_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.status = TaskStatus::Running {
            attempt: self.attempts,
        };
        self.attempts
    }

    pub fn finish(&mut self, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
    }

    /// Result file name, unique per (key, kind).
    pub fn report_file_name(&self) -> String {
        format!("{}_{}.xml", self.key, self.kind.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_counter_tracks_running_state() {
        let mut task = TestTask::new("widgets", TaskKind::BrowserHosted, vec![]);
        assert_eq!(task.status, TaskStatus::Pending);

        assert_eq!(task.start_attempt(), 1);
        assert_eq!(task.status, TaskStatus::Running { attempt: 1 });
        assert_eq!(task.start_attempt(), 2);
        assert_eq!(task.status, TaskStatus::Running { attempt: 2 });

        task.finish(TaskStatus::Passed);
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_report_file_name_separates_kinds() {
        let headless = TestTask::new("widgets", TaskKind::Headless, vec![]);
        let browser = TestTask::new("widgets", TaskKind::BrowserHosted, vec![]);
        assert_eq!(headless.report_file_name(), "widgets_headless.xml");
        assert_eq!(browser.report_file_name(), "widgets_browser.xml");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running { attempt: 1 }.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert_eq!(TaskStatus::Timeout.label(), "timeout");
    }
}
