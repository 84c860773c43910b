//! Campaign orchestration: build the graph, plan, schedule, aggregate.
//!
//! [`Campaign`] wires the components together for one run. The diff and
//! harness backends are injected behind their traits so the whole flow is
//! testable with scripted collaborators; [`Campaign::new`] installs the
//! real ones.

use std::sync::Arc;
use std::time::Instant;

use crate::changeset::{ChangeSetResolver, DiffProvider, GitDiff};
use crate::config::{FleetConfig, RunOptions, RunScope};
use crate::descriptor::scan_repository;
use crate::error::{FleetError, Result};
use crate::graph::ModuleGraph;
use crate::obs::{self, RunSpan};
use crate::planner::TestPlanner;
use crate::report::{ErrorBaseline, ReportAggregator, RunReport};
use crate::scheduler::{HarnessRunner, ProcessHarnessRunner, Scheduler};

pub struct Campaign {
    config: FleetConfig,
    options: RunOptions,
    diff: Arc<dyn DiffProvider>,
    runner: Arc<dyn HarnessRunner>,
}

impl Campaign {
    /// Campaign with the real git and process backends.
    pub fn new(config: FleetConfig, options: RunOptions) -> Self {
        Self::with_backends(
            config,
            options,
            Arc::new(GitDiff),
            Arc::new(ProcessHarnessRunner),
        )
    }

    pub fn with_backends(
        config: FleetConfig,
        options: RunOptions,
        diff: Arc<dyn DiffProvider>,
        runner: Arc<dyn HarnessRunner>,
    ) -> Self {
        Self {
            config,
            options,
            diff,
            runner,
        }
    }

    /// Scan every configured repository and build the frozen graph for
    /// this run.
    pub fn build_graph(&self) -> Result<ModuleGraph> {
        let mut scanned = Vec::new();
        for repository in &self.config.repositories {
            scanned.extend(scan_repository(repository)?);
        }
        let mut graph = ModuleGraph::new();
        graph.build(scanned, &self.config.cycle_overrides, false);
        Ok(graph)
    }

    /// The module keys a run with these options would schedule.
    pub fn plan(&self) -> Result<Vec<String>> {
        self.config.validate()?;
        self.validate_scope()?;
        let graph = Arc::new(self.build_graph()?);
        let planner = TestPlanner::new(graph, self.options.scope.clone())?;
        Ok(planner.plan().to_vec())
    }

    /// Execute the full campaign and fold the outcome into one report.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        let _span = RunSpan::enter(&run_id);
        let started = Instant::now();

        self.config.validate()?;
        self.validate_scope()?;

        let graph = Arc::new(self.build_graph()?);
        let planner = TestPlanner::new(Arc::clone(&graph), self.options.scope.clone())?;
        let plan = planner.plan().to_vec();
        obs::emit_run_started(&run_id, self.config.repositories.len(), plan.len());

        let changes = if self.options.diff_mode {
            Arc::new(
                ChangeSetResolver::resolve(self.diff.as_ref(), &self.config.repositories).await,
            )
        } else {
            Arc::new(ChangeSetResolver::inactive())
        };

        let report_dir = self.config.report_dir.join(&run_id);
        let scheduler = Scheduler::new(
            graph,
            changes,
            Arc::clone(&self.runner),
            self.options.clone(),
            self.config.harness_command.clone(),
            report_dir,
        );
        let outcomes = scheduler.run(&plan).await?;

        if self.options.server_mode {
            // Serve-forever harnesses write no result files.
            obs::emit_run_finished(&run_id, started.elapsed().as_millis() as u64, 0, true);
            return Ok(RunReport::empty());
        }

        let baseline = ErrorBaseline::load(
            &self.config.error_baseline,
            self.options.update_error_baseline,
        )?;
        let mut aggregator = ReportAggregator::new(baseline);
        aggregator.check_report(&outcomes)?;
        aggregator.prepare_report(&outcomes)?;
        aggregator.finish()?;
        let report = aggregator.summarize(&outcomes);

        obs::emit_run_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            report.failing_cases,
            report.success(),
        );
        Ok(report)
    }

    /// Repository names in the scope must be configured; a typo here means
    /// the user would silently test nothing.
    fn validate_scope(&self) -> Result<()> {
        let named = match &self.options.scope {
            RunScope::Repositories(names) | RunScope::Only(names) => names.as_slice(),
            RunScope::All | RunScope::EntryModules(_) => return Ok(()),
        };
        for name in named {
            if self.config.repository(name).is_none() {
                return Err(FleetError::Config {
                    reason: format!("repository '{name}' is not configured"),
                });
            }
        }
        Ok(())
    }
}
