//! Cross-layer run events: progress updates and trigger outcomes.
//!
//! A triggered run resolves to exactly one [`TriggerOutcome`]; while a
//! deep check is in flight it additionally emits [`ProgressUpdate`]s on a
//! bounded channel the caller may hand in. The scheduler passes no
//! channel and only logs; the control plane forwards every update to its
//! client before the terminal event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::check::CheckOutcome;

/// Coarse progress of a run: titles processed out of the selected total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub processed: u32,
    pub total: u32,
}

impl std::fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.processed, self.total)
    }
}

/// Channel half a runner emits progress on. Sends never block a run:
/// emission uses `try_send` and drops updates when the receiver lags.
pub type ProgressSender = mpsc::Sender<ProgressUpdate>;

/// Result of asking the coordinator to run a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The single-flight guard for this job type was already held.
    AlreadyRunning,
    /// The run executed (well or badly) and resolved to an outcome.
    Finished(CheckOutcome),
}
