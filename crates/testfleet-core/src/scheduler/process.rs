//! Harness process lifecycle: spawn, stream, bound, reap.
//!
//! The runner is a trait so the scheduler's retry and state logic can be
//! exercised against scripted outcomes without spawning anything real.
//! The process implementation owns the three observable channels of a
//! harness run — stdout (logged), stderr (classified), terminal status —
//! and guarantees the child dies with the task future via kill-on-drop.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

use crate::error::{FleetError, Result};

/// Fully resolved invocation of the external test harness.
#[derive(Debug, Clone)]
pub struct HarnessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Wall-clock bound; expiry terminates the process.
    pub deadline: Option<Duration>,
}

/// How a harness run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessStatus {
    Exited { code: i32 },
    DeadlineExpired,
}

/// Everything the scheduler needs to judge one attempt.
#[derive(Debug, Clone)]
pub struct HarnessOutcome {
    pub status: HarnessStatus,
    /// Retained stderr lines, warning noise already dropped.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl HarnessOutcome {
    pub fn exited_ok(&self) -> bool {
        matches!(self.status, HarnessStatus::Exited { code: 0 })
    }
}

/// Seam between the scheduler and the external harness.
#[async_trait]
pub trait HarnessRunner: Send + Sync {
    async fn run(&self, command: &HarnessCommand) -> Result<HarnessOutcome>;
}

/// [`HarnessRunner`] that spawns the real harness executable.
#[derive(Debug, Default, Clone)]
pub struct ProcessHarnessRunner;

#[async_trait]
impl HarnessRunner for ProcessHarnessRunner {
    async fn run(&self, command: &HarnessCommand) -> Result<HarnessOutcome> {
        let started = Instant::now();
        let mut child = spawn(command)?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_stdout(stdout));
        }
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(drain_stderr(s)));

        let status = match command.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, child.wait()).await {
                Ok(exit) => HarnessStatus::Exited {
                    code: exit?.code().unwrap_or(-1),
                },
                Err(_) => {
                    child.kill().await.ok();
                    HarnessStatus::DeadlineExpired
                }
            },
            None => HarnessStatus::Exited {
                code: child.wait().await?.code().unwrap_or(-1),
            },
        };

        // The pipe closes when the child dies, so the drain finishes.
        let errors = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(HarnessOutcome {
            status,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn spawn(command: &HarnessCommand) -> Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // An aborted task future must not leak its harness process.
        .kill_on_drop(true);
    if let Some(dir) = &command.current_dir {
        cmd.current_dir(dir);
    }
    cmd.spawn().map_err(|e| FleetError::HarnessSpawn {
        reason: format!("{}: {e}", command.program),
    })
}

async fn drain_stdout(stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "harness", "{line}");
    }
}

/// Collect stderr, logging and dropping warning noise, retaining the rest
/// as error text for the aggregator.
async fn drain_stderr(stderr: ChildStderr) -> Vec<String> {
    let noise = Regex::new(r"(?i)warning").ok();
    let mut retained = Vec::new();
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_warning_noise(&line, &noise) {
            debug!(target: "harness", "{line}");
        } else {
            retained.push(line);
        }
    }
    retained
}

fn is_warning_noise(line: &str, noise: &Option<Regex>) -> bool {
    noise.as_ref().map(|re| re.is_match(line)).unwrap_or(false)
}
