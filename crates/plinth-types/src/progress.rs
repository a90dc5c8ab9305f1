//! Typed events emitted on the transfer channel.
//!
//! Progress is a side effect visible to the UI layer; it never affects the
//! transfer's own control flow. Severity escalates: progress → stall
//! warning → retry scheduled → acquisition budget exceeded → terminal
//! outcome.

use serde::{Deserialize, Serialize};

/// Escalating time budgets selected from the estimated network conditions.
///
/// The emergency ceiling is strictly larger than any inner budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutTier {
    Fast,
    Medium,
    Slow,
    Emergency,
}

impl TimeoutTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for TimeoutTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot emitted after each received transfer unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
    pub throughput_bytes_per_sec: f64,
    /// Estimated time remaining; absent until throughput is observable.
    pub eta_ms: Option<u64>,
    pub attempt: u32,
}

/// Event stream produced by one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferEvent {
    Progress(ProgressEvent),
    /// A per-request budget expired; the transfer stalled but will retry.
    StallWarning { tier: TimeoutTier, attempt: u32 },
    /// Backoff wait before the next attempt.
    RetryScheduled { attempt: u32, delay_ms: u64 },
    /// The overall acquisition budget elapsed; the transfer continues
    /// under the emergency ceiling only. Emitted at most once.
    BudgetExceeded { budget_ms: u64, elapsed_ms: u64 },
    Completed { bytes_received: u64, elapsed_ms: u64 },
    Failed { detail: String },
}
