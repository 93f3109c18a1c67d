//! Session time rules
//!
//! A parking session's duration is counted in whole days with the partial
//! final day counting as a full day: a stay of five days and one minute is
//! six days. Open sessions are measured against the current time.

use chrono::{DateTime, Utc};

/// Duration of a session in whole days (partial final day counts as full).
///
/// `departure = None` means the vehicle is still present; `now` is the
/// measurement instant for open sessions.
pub fn session_duration_days(
    arrival: DateTime<Utc>,
    departure: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let end = departure.unwrap_or(now);
    (end - arrival).num_days() + 1
}
