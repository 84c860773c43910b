//! Error taxonomy for campaign runs.
//!
//! Only configuration-class errors abort a run before scheduling. Task-level
//! failures (timeouts, exhausted retries, missing result files) are folded
//! into the aggregated report instead of being raised here; the run's final
//! success signal comes solely from the aggregate.

use thiserror::Error;

/// Errors produced by the campaign engine.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Invalid campaign configuration; fatal before scheduling.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// An explicit entry point names a module the scan never discovered.
    #[error("entry module '{module}' is not present in the module graph")]
    UnknownEntryModule { module: String },

    /// A module descriptor file could not be parsed.
    #[error("malformed descriptor {path}: {reason}")]
    Descriptor { path: String, reason: String },

    /// Changed paths for a repository could not be computed. Recoverable:
    /// the resolver degrades the repository to "fully changed".
    #[error("changeset for repository '{repository}' failed: {reason}")]
    Changeset { repository: String, reason: String },

    /// No bindable port was found within the probe budget.
    #[error("no free port found after {attempts} probe attempts")]
    PortExhausted { attempts: u32 },

    /// The harness process could not be started.
    #[error("failed to spawn harness: {reason}")]
    HarnessSpawn { reason: String },

    /// A result file could not be read, parsed, or rewritten.
    #[error("result file {path}: {reason}")]
    Report { path: String, reason: String },

    /// A spawned scheduler worker panicked or was torn down.
    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for campaign operations.
pub type Result<T> = std::result::Result<T, FleetError>;
