//! Result aggregation: stub synthesis, namespacing, error folding, and the
//! run verdict.
//!
//! Provides:
//! - [`junit::TestSuite`] / [`junit::SuiteCase`] — the suite/case file model
//! - [`baseline::ErrorBaseline`] — the persisted allowed-errors filter
//! - [`ReportAggregator`] — exactly-once rewriting of every task's result file
//! - [`RunReport`] — the aggregate the run's success signal is derived from
//!
//! The final verdict is derived solely from aggregated cases: a run fails
//! iff some case is a failure, regardless of what the scheduler went
//! through to get there.

pub mod baseline;
pub mod junit;

pub use baseline::ErrorBaseline;
pub use junit::{CaseOutcome, SuiteCase, TestSuite, STUB_SUITE_NAME};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::scheduler::{TaskKind, TaskOutcome, TaskStatus};

/// One task's aggregated result.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub key: String,
    pub kind: TaskKind,
    pub path: PathBuf,
    pub suite: TestSuite,
}

/// The whole run, folded.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
    pub total_cases: u64,
    pub failing_cases: u64,
    pub skipped_tasks: u64,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            total_cases: 0,
            failing_cases: 0,
            skipped_tasks: 0,
            generated_at: Utc::now(),
        }
    }

    pub fn success(&self) -> bool {
        self.failing_cases == 0
    }
}

/// Rewrites every planned task's result file exactly once per run.
///
/// The processed map doubles as the idempotence guard: a file already
/// rewritten this run is never read again, so repeated invocation cannot
/// double-prefix classnames.
pub struct ReportAggregator {
    baseline: ErrorBaseline,
    processed: HashMap<PathBuf, ReportEntry>,
    /// Files synthesized by [`ReportAggregator::check_report`]; these take
    /// the placeholder case unconditionally.
    stubbed: HashSet<PathBuf>,
}

impl ReportAggregator {
    pub fn new(baseline: ErrorBaseline) -> Self {
        Self {
            baseline,
            processed: HashMap::new(),
            stubbed: HashSet::new(),
        }
    }

    /// Ensure every task left a result file on disk, synthesizing stubs
    /// for the ones the harness never wrote.
    pub fn check_report(&mut self, outcomes: &[TaskOutcome]) -> Result<()> {
        for outcome in outcomes {
            if outcome.report_path.exists() {
                continue;
            }
            if outcome.status == TaskStatus::Skipped {
                TestSuite::skipped_stub().save(&outcome.report_path)?;
                continue;
            }
            warn!(
                event = "report.missing",
                key = %outcome.key,
                kind = %outcome.kind,
                path = %outcome.report_path.display(),
            );
            self.stubbed.insert(outcome.report_path.clone());
            TestSuite::failing_stub().save(&outcome.report_path)?;
        }
        Ok(())
    }

    /// Namespace classnames and fold retained process errors into each
    /// result file, once per file.
    pub fn prepare_report(&mut self, outcomes: &[TaskOutcome]) -> Result<()> {
        for outcome in outcomes {
            if self.processed.contains_key(&outcome.report_path) {
                continue;
            }
            let entry = self.rewrite(outcome)?;
            self.processed.insert(outcome.report_path.clone(), entry);
        }
        info!(event = "report.prepared", files = self.processed.len());
        Ok(())
    }

    fn rewrite(&mut self, outcome: &TaskOutcome) -> Result<ReportEntry> {
        let mut suite = TestSuite::load(&outcome.report_path)?;
        for case in &mut suite.cases {
            case.classname = format!("{}.{}", outcome.key, case.classname);
        }

        let reportable: Vec<String> = outcome
            .errors
            .iter()
            .filter(|message| self.baseline.should_report(message))
            .cloned()
            .collect();

        if self.stubbed.contains(&outcome.report_path) {
            // The stub's counters already claim this case.
            let details = if reportable.is_empty() {
                "harness exited without writing its result file".to_string()
            } else {
                reportable.join("\n")
            };
            suite.push_case(error_case(&outcome.key, details));
        } else if !reportable.is_empty() {
            suite.append_case(error_case(&outcome.key, reportable.join("\n")));
        }

        suite.save(&outcome.report_path)?;
        Ok(ReportEntry {
            key: outcome.key.clone(),
            kind: outcome.kind,
            path: outcome.report_path.clone(),
            suite,
        })
    }

    /// Fold processed entries into the run verdict, in outcome order.
    pub fn summarize(&self, outcomes: &[TaskOutcome]) -> RunReport {
        let entries: Vec<ReportEntry> = outcomes
            .iter()
            .filter_map(|o| self.processed.get(&o.report_path))
            .cloned()
            .collect();
        let total_cases = entries.iter().map(|e| e.suite.cases.len() as u64).sum();
        let failing_cases = entries
            .iter()
            .map(|e| e.suite.failing_case_count())
            .sum();
        let skipped_tasks = outcomes
            .iter()
            .filter(|o| o.status == TaskStatus::Skipped)
            .count() as u64;

        RunReport {
            entries,
            total_cases,
            failing_cases,
            skipped_tasks,
            generated_at: Utc::now(),
        }
    }

    /// Persist baseline growth; the only point in the run that mutates it
    /// on disk.
    pub fn finish(&self) -> Result<()> {
        self.baseline.save()
    }
}

fn error_case(key: &str, details: String) -> SuiteCase {
    SuiteCase::failed(
        format!("{key}.Test runtime error"),
        "Some test has not been run, see details",
        details,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn outcome(
        key: &str,
        kind: TaskKind,
        status: TaskStatus,
        errors: &[&str],
        dir: &Path,
    ) -> TaskOutcome {
        TaskOutcome {
            key: key.to_string(),
            kind,
            status,
            attempts: 1,
            port: None,
            errors: errors.iter().map(|s| s.to_string()).collect(),
            report_path: dir.join(format!("{key}_{}.xml", kind.suffix())),
            duration_ms: 5,
        }
    }

    fn write_passing_report(path: &Path) {
        let mut suite = TestSuite::new("Unit Tests");
        suite.append_case(SuiteCase::passed("ButtonTest", "renders"));
        suite.save(path).unwrap();
    }

    fn fresh_aggregator(dir: &Path) -> ReportAggregator {
        let baseline = ErrorBaseline::load(&dir.join("allowed.json"), false).unwrap();
        ReportAggregator::new(baseline)
    }

    #[test]
    fn test_missing_report_becomes_single_failing_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut aggregator = fresh_aggregator(dir.path());
        let outcomes = vec![outcome(
            "widgets",
            TaskKind::Headless,
            TaskStatus::Failed,
            &["harness exited with code 1"],
            dir.path(),
        )];

        aggregator.check_report(&outcomes).unwrap();
        aggregator.prepare_report(&outcomes).unwrap();

        let suite = TestSuite::load(&outcomes[0].report_path).unwrap();
        assert_eq!((suite.tests, suite.failures, suite.errors), (1, 1, 1));
        assert_eq!(suite.cases.len(), 1);
        assert!(suite.cases[0].is_failed());
        assert_eq!(suite.cases[0].classname, "widgets.Test runtime error");
    }

    #[test]
    fn test_classnames_namespaced_by_owning_key() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome(
            "widgets",
            TaskKind::Headless,
            TaskStatus::Passed,
            &[],
            dir.path(),
        )];
        write_passing_report(&outcomes[0].report_path);

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.check_report(&outcomes).unwrap();
        aggregator.prepare_report(&outcomes).unwrap();

        let suite = TestSuite::load(&outcomes[0].report_path).unwrap();
        assert_eq!(suite.cases[0].classname, "widgets.ButtonTest");
    }

    #[test]
    fn test_prepare_twice_does_not_double_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome(
            "widgets",
            TaskKind::Headless,
            TaskStatus::Passed,
            &[],
            dir.path(),
        )];
        write_passing_report(&outcomes[0].report_path);

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.prepare_report(&outcomes).unwrap();
        aggregator.prepare_report(&outcomes).unwrap();

        let suite = TestSuite::load(&outcomes[0].report_path).unwrap();
        assert_eq!(suite.cases[0].classname, "widgets.ButtonTest");
    }

    #[test]
    fn test_baseline_suppresses_known_process_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("allowed.json"),
            r#"["driver chatter on startup"]"#,
        )
        .unwrap();
        let outcomes = vec![outcome(
            "widgets",
            TaskKind::Headless,
            TaskStatus::Passed,
            &["driver chatter on startup"],
            dir.path(),
        )];
        write_passing_report(&outcomes[0].report_path);

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.prepare_report(&outcomes).unwrap();

        let suite = TestSuite::load(&outcomes[0].report_path).unwrap();
        assert_eq!(suite.cases.len(), 1, "suppressed errors add no case");
        assert!(!suite.has_failing_cases());
    }

    #[test]
    fn test_unknown_process_errors_become_failing_case() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome(
            "widgets",
            TaskKind::Headless,
            TaskStatus::Passed,
            &["net::ERR_CONNECTION_RESET during fetch"],
            dir.path(),
        )];
        write_passing_report(&outcomes[0].report_path);

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.prepare_report(&outcomes).unwrap();

        let suite = TestSuite::load(&outcomes[0].report_path).unwrap();
        assert_eq!(suite.cases.len(), 2);
        assert_eq!((suite.tests, suite.failures), (2, 1));
        assert_eq!(
            suite.cases[1].outcome,
            CaseOutcome::Failed {
                message: "net::ERR_CONNECTION_RESET during fetch".to_string()
            }
        );
    }

    #[test]
    fn test_skipped_task_yields_non_failing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome(
            "forms",
            TaskKind::Headless,
            TaskStatus::Skipped,
            &[],
            dir.path(),
        )];

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.check_report(&outcomes).unwrap();
        aggregator.prepare_report(&outcomes).unwrap();

        let report = aggregator.summarize(&outcomes);
        assert!(report.success());
        assert_eq!(report.skipped_tasks, 1);
        assert_eq!(report.entries[0].suite.cases[0].classname, "forms.Changeset");
        assert_eq!(
            report.entries[0].suite.cases[0].outcome,
            CaseOutcome::Skipped
        );
    }

    #[test]
    fn test_summary_counts_failures_across_entries() {
        let dir = tempfile::tempdir().unwrap();
        let passing = outcome("core", TaskKind::Headless, TaskStatus::Passed, &[], dir.path());
        write_passing_report(&passing.report_path);
        let crashed = outcome(
            "widgets",
            TaskKind::BrowserHosted,
            TaskStatus::Failed,
            &["failed to launch the browser"],
            dir.path(),
        );
        let outcomes = vec![passing, crashed];

        let mut aggregator = fresh_aggregator(dir.path());
        aggregator.check_report(&outcomes).unwrap();
        aggregator.prepare_report(&outcomes).unwrap();

        let report = aggregator.summarize(&outcomes);
        assert!(!report.success());
        assert_eq!(report.total_cases, 2);
        assert_eq!(report.failing_cases, 1);
        assert_eq!(report.entries.len(), 2);
    }
}
