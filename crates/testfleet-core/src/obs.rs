//! Structured observability hooks for campaign lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, task terminal
//!   states, changeset degradation, run finish
//!
//! Events are emitted at `info!` level and filtered via `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// campaign.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // All tracing calls are now associated with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("testfleet.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: campaign started.
pub fn emit_run_started(run_id: &str, repositories: usize, planned_modules: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        repositories = repositories,
        planned_modules = planned_modules,
    );
}

/// Emit event: one task reached a terminal state.
pub fn emit_task_finished(key: &str, kind: &str, status: &str, attempts: u32, duration_ms: u64) {
    info!(
        event = "task.finished",
        key = %key,
        kind = %kind,
        status = %status,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: campaign finished with the aggregate verdict.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, failing_cases: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failing_cases = failing_cases,
        success = success,
    );
}

/// Emit event: a repository's changeset could not be computed and the
/// repository was degraded to "fully changed" (warning level).
pub fn emit_changeset_degraded(repository: &str, error: &dyn std::fmt::Display) {
    warn!(event = "changeset.degraded", repository = %repository, error = %error);
}
