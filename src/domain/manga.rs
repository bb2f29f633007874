//! Tracked-title records and the read models the job runners work with.
//!
//! Timestamps are epoch milliseconds. The store keeps `0` (or `-1` for
//! `last_check`) as "never happened"; the invariant that matters here is
//! that `last_update` and `last_deep_check_find` only ever move forward
//! per title.

use serde::{Deserialize, Serialize};

/// One (user, title) tracking row from `user_manga`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedManga {
    pub user_id: String,
    pub manga_id: String,
    /// Last time a client asked about this title.
    pub last_check: i64,
    /// Last time the engine observed a chapter update.
    pub last_update: i64,
    pub last_deep_check: i64,
    /// Publish time of the newest chapter seen by a deep probe.
    pub last_deep_check_find: i64,
    pub manga_title: Option<String>,
    pub manga_status: Option<String>,
    pub last_volume: Option<String>,
    pub last_chapter: Option<String>,
    pub last_title_check: i64,
}

/// Deep-probe candidate: the per-title watermarks the prober compares a
/// fetched chapter against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepCheckCandidate {
    pub manga_id: String,
    pub last_update: i64,
    pub last_deep_check: i64,
    pub last_deep_check_find: i64,
}

impl DeepCheckCandidate {
    /// The publish-time floor a probed chapter must exceed to count as an
    /// update. A title the incremental scan touched after the last deep
    /// probe is measured against that scan's watermark; otherwise against
    /// the chapter time the previous probe found.
    pub fn probe_floor(&self) -> i64 {
        if self.last_update > self.last_deep_check {
            self.last_update
        } else {
            self.last_deep_check_find
        }
    }
}

/// Title metadata resolved from the catalog, ready to write back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleDetail {
    pub manga_id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub last_volume: Option<String>,
    pub last_chapter: Option<String>,
}

/// A title the refresher currently cannot resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTitle {
    pub manga_id: String,
    pub last_failure: i64,
}

/// Push-notification target for one run: who to tell, with which
/// application token, about how many of their titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPushTarget {
    pub user_id: String,
    pub push_token: String,
    pub app_token_override: Option<String>,
    /// Titles of this user whose `last_update` equals the run epoch.
    pub updated_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(last_update: i64, last_deep_check: i64, last_deep_check_find: i64) -> DeepCheckCandidate {
        DeepCheckCandidate {
            manga_id: "m1".to_string(),
            last_update,
            last_deep_check,
            last_deep_check_find,
        }
    }

    #[test]
    fn floor_prefers_fresh_incremental_watermark() {
        // Incremental scan saw an update after the last deep probe.
        assert_eq!(candidate(5_000, 3_000, 2_000).probe_floor(), 5_000);
    }

    #[test]
    fn floor_falls_back_to_previous_find() {
        // Deep probe ran more recently than any incremental hit.
        assert_eq!(candidate(1_000, 3_000, 2_500).probe_floor(), 2_500);
        // Never updated, never found: floor is the zero sentinel, so any
        // real chapter time clears it.
        assert_eq!(candidate(0, 0, 0).probe_floor(), 0);
    }
}
