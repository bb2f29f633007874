//! Small time helpers shared across the job runners.
//!
//! All engine timestamps are epoch milliseconds; these helpers keep the
//! log output readable without dragging formatting concerns into the
//! runners themselves.

use chrono::{DateTime, Utc};

/// One second in epoch milliseconds.
pub const SECOND_MS: i64 = 1_000;
/// One minute in epoch milliseconds.
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
/// One hour in epoch milliseconds.
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
/// One day in epoch milliseconds.
pub const DAY_MS: i64 = 24 * HOUR_MS;
/// One week in epoch milliseconds.
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-milliseconds timestamp for log lines.
///
/// Out-of-range values (the store uses `-1`/`0` as "never" sentinels) are
/// rendered literally instead of being coerced to a bogus date.
pub fn format_epoch(epoch_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(epoch_ms) {
        Some(dt) if epoch_ms > 0 => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("epoch({epoch_ms})"),
    }
}

/// Render a millisecond duration as `1h 2m 3s 45ms`, omitting zero parts.
pub fn format_duration_ms(duration_ms: i64) -> String {
    if duration_ms <= 0 {
        return "0ms".to_string();
    }
    let hours = duration_ms / HOUR_MS;
    let minutes = (duration_ms / MINUTE_MS) % 60;
    let seconds = (duration_ms / SECOND_MS) % 60;
    let millis = duration_ms % SECOND_MS;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    if millis > 0 {
        parts.push(format!("{millis}ms"));
    }
    parts.join(" ")
}
