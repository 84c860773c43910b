//! Run-scoped port allocation for browser-hosted harnesses.
//!
//! A port is offered to a task only if it is absent from the run's
//! claimed-set and a bind probe succeeds. The claimed-set stops two
//! in-flight tasks from racing for a port that probes free for both;
//! the probe catches ports held by processes outside this run. Claims
//! are RAII: dropping a [`PortClaim`] releases the claimed-set entry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tokio::net::TcpListener;
use tracing::debug;

use crate::error::{FleetError, Result};

/// Bottom of the random probing range.
const RANDOM_PORT_FLOOR: u16 = 40_000;
/// Width of the random probing range.
const RANDOM_PORT_SPAN: u16 = 10_000;
/// Candidates tried before giving up on a claim.
const MAX_PROBE_ATTEMPTS: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    /// Ports offered in order before random probing starts.
    preferred: Vec<u16>,
    claimed: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new(preferred: Vec<u16>) -> Self {
        Self {
            preferred,
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim a free port for one task attempt.
    ///
    /// Candidates are the preferred list in order, then uniform random
    /// ports in `[RANDOM_PORT_FLOOR, RANDOM_PORT_FLOOR + RANDOM_PORT_SPAN)`.
    pub async fn claim(&self) -> Result<PortClaim> {
        for attempt in 0..MAX_PROBE_ATTEMPTS {
            let candidate = match self.preferred.get(attempt) {
                Some(port) => *port,
                None => {
                    RANDOM_PORT_FLOOR + rand::thread_rng().gen_range(0..RANDOM_PORT_SPAN)
                }
            };

            // Reserve before probing so a parallel claimer cannot probe the
            // same candidate to success.
            if !lock_claimed(&self.claimed).insert(candidate) {
                continue;
            }
            if probe(candidate).await {
                debug!(event = "ports.claimed", port = candidate);
                return Ok(PortClaim {
                    port: candidate,
                    claimed: Arc::clone(&self.claimed),
                });
            }
            lock_claimed(&self.claimed).remove(&candidate);
        }

        Err(FleetError::PortExhausted {
            attempts: MAX_PROBE_ATTEMPTS as u32,
        })
    }
}

/// Bind probe: a port is usable iff a listener binds and is immediately
/// dropped.
async fn probe(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}

fn lock_claimed(claimed: &Mutex<HashSet<u16>>) -> MutexGuard<'_, HashSet<u16>> {
    claimed.lock().unwrap_or_else(|e| e.into_inner())
}

/// A claimed port, held for one task attempt's lifetime.
#[derive(Debug)]
pub struct PortClaim {
    port: u16,
    claimed: Arc<Mutex<HashSet<u16>>>,
}

impl PortClaim {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        lock_claimed(&self.claimed).remove(&self.port);
        debug!(event = "ports.released", port = self.port);
    }
}
