//! Check-run vocabulary: job kinds, outcomes and the persisted run row.
//!
//! Result codes cross two boundaries with fixed integer values (the
//! `update_check` table and the control-plane wire): NO_ITEMS = -1,
//! UNKNOWN_ERROR = -2, SERVICE_UNAVAILABLE = -3, 0 = completed with no
//! updates, positive = completed update count. Inside the engine only the
//! enum below is passed around; the integers appear at those boundaries
//! and nowhere else.

use serde::{Deserialize, Serialize};

/// The three background job types the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    /// Incremental scan of the catalog chapter feed.
    Update,
    /// Batch refresh of cached title metadata.
    Titles,
    /// Per-title latest-chapter probe over stale titles.
    Deep,
}

impl CheckKind {
    /// Stable identifier used as the `check_type` column value.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Update => "update",
            CheckKind::Titles => "titles",
            CheckKind::Deep => "deep",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    /// The selection query produced nothing to work on.
    NoItems,
    /// Transport failure, unexpected HTTP status, or a store failure.
    UnknownError,
    /// The catalog answered with an availability-class status.
    ServiceUnavailable,
    /// The run finished; the count is how many titles were found updated
    /// (or resolved, for a title refresh). Zero means "no updates".
    Completed(u32),
}

impl CheckOutcome {
    pub const NO_ITEMS_CODE: i64 = -1;
    pub const UNKNOWN_ERROR_CODE: i64 = -2;
    pub const SERVICE_UNAVAILABLE_CODE: i64 = -3;

    /// Integer form for the store and the control-plane wire.
    pub fn as_code(self) -> i64 {
        match self {
            CheckOutcome::NoItems => Self::NO_ITEMS_CODE,
            CheckOutcome::UnknownError => Self::UNKNOWN_ERROR_CODE,
            CheckOutcome::ServiceUnavailable => Self::SERVICE_UNAVAILABLE_CODE,
            CheckOutcome::Completed(count) => i64::from(count),
        }
    }

    /// Inverse of [`as_code`](Self::as_code); unknown negative codes
    /// collapse to `UnknownError`.
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::NO_ITEMS_CODE => CheckOutcome::NoItems,
            Self::SERVICE_UNAVAILABLE_CODE => CheckOutcome::ServiceUnavailable,
            c if c >= 0 => CheckOutcome::Completed(u32::try_from(c).unwrap_or(u32::MAX)),
            _ => CheckOutcome::UnknownError,
        }
    }

    /// A run that reached its end, found work or not.
    pub fn is_success(self) -> bool {
        matches!(self, CheckOutcome::Completed(_))
    }

    /// Number of updated titles, when the run completed with any.
    pub fn update_count(self) -> Option<u32> {
        match self {
            CheckOutcome::Completed(count) if count > 0 => Some(count),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckOutcome::NoItems => write!(f, "no items"),
            CheckOutcome::UnknownError => write!(f, "unknown error"),
            CheckOutcome::ServiceUnavailable => write!(f, "service unavailable"),
            CheckOutcome::Completed(0) => write!(f, "no updates"),
            CheckOutcome::Completed(count) => write!(f, "{count} updated"),
        }
    }
}

/// What a run function hands back for persistence: the outcome plus the
/// job-specific secondary counter ("hit pagination cap" for the
/// incremental scan, titles probed for the deep check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: CheckOutcome,
    pub extra: Option<i64>,
}

impl RunReport {
    pub fn new(outcome: CheckOutcome) -> Self {
        Self {
            outcome,
            extra: None,
        }
    }

    pub fn with_extra(outcome: CheckOutcome, extra: i64) -> Self {
        Self {
            outcome,
            extra: Some(extra),
        }
    }
}

/// One row of the `update_check` log as read back from the store.
/// `end_time`/`result` are `None` while the run is still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub kind: CheckKind,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub result: Option<i64>,
    pub extra: Option<i64>,
}

impl CheckRun {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn outcome(&self) -> Option<CheckOutcome> {
        self.result.map(CheckOutcome::from_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CheckOutcome::NoItems, -1)]
    #[case(CheckOutcome::UnknownError, -2)]
    #[case(CheckOutcome::ServiceUnavailable, -3)]
    #[case(CheckOutcome::Completed(0), 0)]
    #[case(CheckOutcome::Completed(17), 17)]
    fn outcome_codes_round_trip(#[case] outcome: CheckOutcome, #[case] code: i64) {
        assert_eq!(outcome.as_code(), code);
        assert_eq!(CheckOutcome::from_code(code), outcome);
    }

    #[test]
    fn unknown_negative_codes_collapse_to_unknown_error() {
        assert_eq!(CheckOutcome::from_code(-9), CheckOutcome::UnknownError);
    }

    #[test]
    fn only_completed_counts_as_success() {
        assert!(CheckOutcome::Completed(0).is_success());
        assert!(CheckOutcome::Completed(3).is_success());
        assert!(!CheckOutcome::NoItems.is_success());
        assert!(!CheckOutcome::ServiceUnavailable.is_success());
    }

    #[test]
    fn update_count_is_only_positive_completions() {
        assert_eq!(CheckOutcome::Completed(0).update_count(), None);
        assert_eq!(CheckOutcome::Completed(4).update_count(), Some(4));
        assert_eq!(CheckOutcome::NoItems.update_count(), None);
    }

    #[test]
    fn running_row_has_no_outcome() {
        let row = CheckRun {
            kind: CheckKind::Deep,
            start_time: 1_000,
            end_time: None,
            result: None,
            extra: Some(40),
        };
        assert!(row.is_running());
        assert_eq!(row.outcome(), None);
    }
}
