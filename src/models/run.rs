//! Run states and the summary of one pipeline execution.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Stages of one run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Notifying,
    Done,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Fetching => "fetching",
            RunStage::Reconciling => "reconciling",
            RunStage::Persisting => "persisting",
            RunStage::Notifying => "notifying",
            RunStage::Done => "done",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Done,
    Failed { stage: RunStage, reason: String },
}

/// Outcome of a single notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyResult {
    Sent,
    Skipped(String),
    Failed(String),
}

/// Per-run notification tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyTally {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl NotifyTally {
    pub fn record(&mut self, result: &NotifyResult) {
        match result {
            NotifyResult::Sent => self.sent += 1,
            NotifyResult::Skipped(_) => self.skipped += 1,
            NotifyResult::Failed(_) => self.failed += 1,
        }
    }

    /// Number of dispatch attempts, whatever their outcome.
    pub fn attempts(&self) -> usize {
        self.sent + self.skipped + self.failed
    }
}

/// Summary of one pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    /// Listings returned by the source
    pub fetched: usize,
    /// Listings persisted by this run
    pub new_records: usize,
    /// Listings already known or repeated within the batch
    pub duplicates: usize,
    /// Listings without a usable identity
    pub unkeyed: usize,
    pub notify: NotifyTally,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}
