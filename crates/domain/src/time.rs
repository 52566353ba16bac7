//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for readings, last-seen and last-fired bookkeeping.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `window` has fully elapsed between `since` and `at`.
///
/// A negative interval (clock moved backwards) counts as not elapsed.
#[must_use]
pub fn has_elapsed(since: Timestamp, at: Timestamp, window: std::time::Duration) -> bool {
    match at.signed_duration_since(since).to_std() {
        Ok(elapsed) => elapsed >= window,
        Err(_) => false,
    }
}
