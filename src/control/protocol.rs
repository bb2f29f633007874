//! Control-socket wire types.
//!
//! Requests and events are single JSON objects, one per line. Events are
//! tagged by an `event` field; numeric payloads travel as strings, which
//! is what existing tooling around the socket parses.

use serde::{Deserialize, Serialize};

use crate::domain::check::{CheckKind, CheckOutcome};
use crate::domain::events::ProgressUpdate;

/// Wire command for a title-metadata refresh.
pub const TITLE_CHECK: &str = "title-check";
/// Wire command for a deep probe run.
pub const DEEP_CHECK: &str = "deep-check";

/// The one request shape the socket accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub trigger: String,
}

impl TriggerRequest {
    pub fn new(command: &str) -> Self {
        Self {
            trigger: command.to_string(),
        }
    }

    /// Job kind for the requested command; `None` for anything the
    /// socket does not expose (the incremental scan is cron-only).
    pub fn kind(&self) -> Option<CheckKind> {
        match self.trigger.as_str() {
            TITLE_CHECK => Some(CheckKind::Titles),
            DEEP_CHECK => Some(CheckKind::Deep),
            _ => None,
        }
    }
}

/// Everything the daemon writes back over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ControlEvent {
    Unsupported,
    AlreadyRunning,
    NoItems,
    Failure { code: String },
    Success { count: String },
    Progress { text: String },
}

impl ControlEvent {
    /// Terminal event for a finished run's outcome.
    pub fn from_outcome(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::NoItems => ControlEvent::NoItems,
            CheckOutcome::Completed(count) => ControlEvent::Success {
                count: count.to_string(),
            },
            failure => ControlEvent::Failure {
                code: failure.as_code().to_string(),
            },
        }
    }

    pub fn progress(update: ProgressUpdate) -> Self {
        ControlEvent::Progress {
            text: update.to_string(),
        }
    }

    /// Whether the client should exit zero on this terminal event.
    pub fn indicates_success(&self) -> bool {
        matches!(self, ControlEvent::Success { .. } | ControlEvent::NoItems)
    }
}
