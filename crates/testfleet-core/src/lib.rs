//! Testfleet Core Library
//!
//! Re-exports the campaign components for programmatic access: graph
//! building, change-aware planning, concurrent scheduling, and report
//! aggregation.

pub mod campaign;
pub mod changeset;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod obs;
pub mod planner;
pub mod report;
pub mod scheduler;
pub mod telemetry;

pub use campaign::Campaign;

pub use changeset::{ChangeSetResolver, DiffProvider, GitDiff};

pub use config::{
    CoverageFormat, CycleOverride, FleetConfig, KindFilter, RepositoryConfig, RunDefaults,
    RunOptions, RunScope,
};

pub use descriptor::{scan_repository, Module, ModuleDescriptor, DESCRIPTOR_EXT};

pub use error::{FleetError, Result};

pub use graph::ModuleGraph;

pub use planner::TestPlanner;

pub use report::{
    CaseOutcome, ErrorBaseline, ReportAggregator, ReportEntry, RunReport, SuiteCase, TestSuite,
};

pub use scheduler::{
    HarnessCommand, HarnessConfig, HarnessOutcome, HarnessRunner, HarnessStatus, PortAllocator,
    ProcessHarnessRunner, Scheduler, TaskKind, TaskOutcome, TaskStatus, TestTask,
};

pub use obs::{
    emit_changeset_degraded, emit_run_finished, emit_run_started, emit_task_finished, RunSpan,
};
pub use telemetry::init_tracing;

/// Testfleet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
