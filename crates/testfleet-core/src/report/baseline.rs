//! Persisted allowed-errors baseline.
//!
//! Harness processes emit environment noise that is not a test failure
//! (driver chatter, CDN hiccups already investigated). Messages listed in
//! the baseline are suppressed during aggregation. In regeneration mode
//! the filter inverts: newly seen messages are recorded instead of
//! reported, and the grown list is written back at end of run.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FleetError, Result};

#[derive(Debug)]
pub struct ErrorBaseline {
    path: PathBuf,
    /// Normalized accepted messages, in file order.
    known: Vec<String>,
    regenerate: bool,
    dirty: bool,
}

impl ErrorBaseline {
    /// Load the baseline; a missing file is an empty baseline, not an
    /// error.
    pub fn load(path: &Path, regenerate: bool) -> Result<Self> {
        let known = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| FleetError::Report {
                path: path.display().to_string(),
                reason: format!("malformed allowed-errors baseline: {e}"),
            })?
        } else {
            Vec::new()
        };
        debug!(event = "baseline.loaded", entries = known.len(), regenerate = regenerate);
        Ok(Self {
            path: path.to_path_buf(),
            known,
            regenerate,
            dirty: false,
        })
    }

    /// Whether `message` should surface in the aggregated report.
    ///
    /// Known messages never surface. In regeneration mode an unknown
    /// message is absorbed into the baseline instead of surfacing.
    pub fn should_report(&mut self, message: &str) -> bool {
        let normalized = normalize(message);
        if normalized.is_empty() {
            return false;
        }
        if self.known.iter().any(|known| known == &normalized) {
            return false;
        }
        if self.regenerate {
            self.known.push(normalized);
            self.dirty = true;
            return false;
        }
        true
    }

    /// Persist the baseline if regeneration changed it. Called once, at
    /// end of run.
    pub fn save(&self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(&self.known)?;
        std::fs::write(&self.path, text)?;
        info!(
            event = "baseline.saved",
            path = %self.path.display(),
            entries = self.known.len(),
        );
        Ok(())
    }
}

/// Collapse whitespace runs so cosmetic formatting differences do not
/// defeat the match.
fn normalize(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
