//! Wall clock helpers.

use chrono::Utc;

/// Microseconds since the Unix epoch, UTC.
///
/// Block access times are recorded in this unit both in memory and in the journal.
pub fn utc_now_micros() -> i64 {
    Utc::now().timestamp_micros()
}
