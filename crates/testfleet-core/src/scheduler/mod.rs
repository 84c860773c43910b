//! Concurrent task execution over the planned module list.
//!
//! Provides:
//! - [`task::TestTask`] / [`task::TaskStatus`] — task identity and lifecycle
//! - [`ports::PortAllocator`] — claimed-set plus bind-probe port allocation
//! - [`flake::classify`] — ordered substring flake classification
//! - [`process::HarnessRunner`] — the process-spawning seam
//! - [`harness::HarnessConfig`] — the per-task config file contract
//! - [`Scheduler`] — the bounded worker pool tying them together
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use testfleet_core::scheduler::{Scheduler, ProcessHarnessRunner};
//!
//! let scheduler = Scheduler::new(graph, changes, runner, options, harness, report_dir);
//! let outcomes = scheduler.run(planner.plan()).await?;
//! ```

pub mod flake;
pub mod harness;
pub mod ports;
pub mod process;
pub mod task;

pub use flake::FlakeKind;
pub use harness::{harness_command, HarnessConfig};
pub use ports::{PortAllocator, PortClaim};
pub use process::{
    HarnessCommand, HarnessOutcome, HarnessRunner, HarnessStatus, ProcessHarnessRunner,
};
pub use task::{TaskKind, TaskStatus, TestTask};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::changeset::ChangeSetResolver;
use crate::config::{KindFilter, RunOptions};
use crate::error::{FleetError, Result};
use crate::graph::ModuleGraph;
use crate::obs;

/// Terminal record of one task, handed to the aggregator.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub key: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub attempts: u32,
    /// Port held by the final attempt, browser tasks only.
    pub port: Option<u16>,
    /// Retained process-level error text.
    pub errors: Vec<String>,
    /// Where the harness was told to write its result file.
    pub report_path: PathBuf,
    pub duration_ms: u64,
}

/// Bounded worker pool executing planned tasks.
///
/// Cloneable so each spawned worker owns its handles; the graph and
/// resolver are shared read-only, the port claimed-set is shared through
/// the allocator.
#[derive(Clone)]
pub struct Scheduler {
    graph: Arc<ModuleGraph>,
    changes: Arc<ChangeSetResolver>,
    runner: Arc<dyn HarnessRunner>,
    options: RunOptions,
    harness_command: Vec<String>,
    report_dir: PathBuf,
    ports: PortAllocator,
}

impl Scheduler {
    pub fn new(
        graph: Arc<ModuleGraph>,
        changes: Arc<ChangeSetResolver>,
        runner: Arc<dyn HarnessRunner>,
        options: RunOptions,
        harness_command: Vec<String>,
        report_dir: PathBuf,
    ) -> Self {
        let ports = PortAllocator::new(options.preferred_ports.clone());
        Self {
            graph,
            changes,
            runner,
            options,
            harness_command,
            report_dir,
            ports,
        }
    }

    /// Execute every task derived from the plan and collect the terminal
    /// outcomes. Task failures are data, not errors; only a panicked or
    /// cancelled worker aborts the run.
    pub async fn run(&self, plan: &[String]) -> Result<Vec<TaskOutcome>> {
        let tasks = self.expand_plan(plan);
        std::fs::create_dir_all(&self.report_dir)?;
        info!(
            event = "schedule.started",
            tasks = tasks.len(),
            concurrency = self.options.concurrency,
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut workers = JoinSet::new();
        for task in tasks {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                worker.execute(task).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // Kill-on-drop children die with their aborted futures.
                    workers.abort_all();
                    return Err(FleetError::TaskJoin(e.to_string()));
                }
            }
        }
        Ok(outcomes)
    }

    /// One task per planned (key, kind) pair the capability and mode flags
    /// allow. Interactive server mode hosts browser suites only.
    fn expand_plan(&self, plan: &[String]) -> Vec<TestTask> {
        let mut tasks = Vec::new();
        for key in plan {
            let Some(module) = self.graph.get(key) else {
                continue;
            };
            let headless = module.has_unit_test
                && !self.options.server_mode
                && self.options.kinds != KindFilter::BrowserOnly;
            let browser = module.browser_capable && self.options.kinds != KindFilter::HeadlessOnly;
            if headless {
                tasks.push(TestTask::new(
                    key.clone(),
                    TaskKind::Headless,
                    vec![key.clone()],
                ));
            }
            if browser {
                tasks.push(TestTask::new(
                    key.clone(),
                    TaskKind::BrowserHosted,
                    vec![key.clone()],
                ));
            }
        }
        tasks
    }

    async fn execute(self, mut task: TestTask) -> TaskOutcome {
        let eligible = self
            .graph
            .get(&task.key)
            .map(|module| self.changes.should_test_module(module))
            .unwrap_or(false);
        if !eligible {
            debug!(event = "task.skipped", key = %task.key, kind = %task.kind);
            task.finish(TaskStatus::Skipped);
            obs::emit_task_finished(&task.key, task.kind.suffix(), task.status.label(), 0, 0);
            return self.outcome_for(task, Vec::new(), 0);
        }

        let report_path = self.report_dir.join(task.report_file_name());
        let mut errors: Vec<String> = Vec::new();
        let mut total_ms = 0u64;

        let status = loop {
            let attempt = task.start_attempt();

            // Browser harnesses need a port before spawning; the claim is
            // scoped to this attempt, so a retry starts from a fresh one.
            let claim = match task.kind {
                TaskKind::BrowserHosted => match self.ports.claim().await {
                    Ok(claim) => Some(claim),
                    Err(e) => {
                        errors.push(e.to_string());
                        break TaskStatus::Failed;
                    }
                },
                TaskKind::Headless => None,
            };
            task.port = claim.as_ref().map(|c| c.port());

            let outcome = match self.run_attempt(&task, &report_path).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    errors.push(e.to_string());
                    break TaskStatus::Failed;
                }
            };
            total_ms += outcome.duration_ms;

            match outcome.status {
                HarnessStatus::DeadlineExpired => {
                    errors.push(format!(
                        "harness exceeded the {}s deadline and was terminated",
                        self.options.headless_timeout_secs
                    ));
                    break TaskStatus::Timeout;
                }
                HarnessStatus::Exited { code: 0 } => {
                    errors.extend(outcome.errors);
                    break TaskStatus::Passed;
                }
                HarnessStatus::Exited { code } => {
                    let failure_text = outcome.errors.join("\n");
                    let flaked = matches!(task.kind, TaskKind::BrowserHosted)
                        .then(|| flake::classify(&failure_text))
                        .flatten();
                    match flaked {
                        Some(kind) if attempt < self.options.max_attempts => {
                            warn!(
                                event = "task.flake_retry",
                                key = %task.key,
                                attempt = attempt,
                                flake = ?kind,
                            );
                            continue;
                        }
                        Some(_) => {
                            errors.extend(outcome.errors);
                            errors.push(format!(
                                "flaky failure persisted after {attempt} attempts"
                            ));
                            break TaskStatus::Failed;
                        }
                        None => {
                            debug!(
                                event = "task.harness_failed",
                                key = %task.key,
                                code = code,
                            );
                            errors.extend(outcome.errors);
                            break TaskStatus::Failed;
                        }
                    }
                }
            }
        };

        task.finish(status);
        obs::emit_task_finished(
            &task.key,
            task.kind.suffix(),
            status.label(),
            task.attempts,
            total_ms,
        );
        self.outcome_for(task, errors, total_ms)
    }

    async fn run_attempt(&self, task: &TestTask, report_path: &Path) -> Result<HarnessOutcome> {
        // The harness resolves module names against the directory holding
        // the module directories.
        let module_root = self
            .graph
            .get(&task.key)
            .map(|m| m.path.parent().unwrap_or(&m.path).to_path_buf())
            .unwrap_or_default();
        let config = HarnessConfig::for_task(task, &module_root, report_path, &self.options);
        let config_path = config.write(&self.report_dir, task)?;

        let deadline = match task.kind {
            TaskKind::Headless => Some(Duration::from_secs(self.options.headless_timeout_secs)),
            TaskKind::BrowserHosted => None,
        };
        let command = harness_command(
            &self.harness_command,
            task.kind,
            &config_path,
            self.options.server_mode,
            deadline,
        );
        self.runner.run(&command).await
    }

    fn outcome_for(&self, task: TestTask, errors: Vec<String>, duration_ms: u64) -> TaskOutcome {
        TaskOutcome {
            report_path: self.report_dir.join(task.report_file_name()),
            key: task.key,
            kind: task.kind,
            status: task.status,
            attempts: task.attempts,
            port: task.port,
            errors,
            duration_ms,
        }
    }
}
