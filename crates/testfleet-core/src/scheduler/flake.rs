//! Transient-failure classification.
//!
//! Flake detection is an ordered substring match over the captured failure
//! text, kept separate from process handling so the rules are testable
//! without spawning anything. First matching rule wins.

/// Transient failure categories the scheduler will retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakeKind {
    /// The harness lost the race for its assigned port.
    PortCollision,
    /// The hosting browser or its driver failed to come up.
    BrowserLaunch,
    /// A network fetch failed while the harness bootstrapped.
    NetworkFetch,
}

struct FlakeRule {
    pattern: &'static str,
    kind: FlakeKind,
}

/// Matched in order against lowercased failure text.
const FLAKE_RULES: &[FlakeRule] = &[
    FlakeRule {
        pattern: "address already in use",
        kind: FlakeKind::PortCollision,
    },
    FlakeRule {
        pattern: "eaddrinuse",
        kind: FlakeKind::PortCollision,
    },
    FlakeRule {
        pattern: "failed to launch",
        kind: FlakeKind::BrowserLaunch,
    },
    FlakeRule {
        pattern: "session not created",
        kind: FlakeKind::BrowserLaunch,
    },
    FlakeRule {
        pattern: "err_connection",
        kind: FlakeKind::NetworkFetch,
    },
    FlakeRule {
        pattern: "econnreset",
        kind: FlakeKind::NetworkFetch,
    },
    FlakeRule {
        pattern: "socket hang up",
        kind: FlakeKind::NetworkFetch,
    },
];

/// Classify failure output; `None` means a genuine failure, not retryable.
pub fn classify(output: &str) -> Option<FlakeKind> {
    let haystack = output.to_lowercase();
    FLAKE_RULES
        .iter()
        .find(|rule| haystack.contains(rule.pattern))
        .map(|rule| rule.kind)
}
