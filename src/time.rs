//! Wall-clock helpers shared by the cache, store, and handler.
//!
//! Every clock read in this crate funnels through here so the two units in
//! play — seconds for `expiry_ts`, milliseconds for `in_progress_expiry_ms`
//! — are never computed ad hoc at a call site.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current unix time in milliseconds.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
