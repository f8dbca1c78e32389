//! Scheduling helpers for the ingestion timer
//!
//! Pure functions so the scheduler can be tested without clocks or threads.

use chrono::{DateTime, Utc};

/// Check whether the poll interval has elapsed since the last cycle.
///
/// # Arguments
/// * `last_run` - When the last cycle started (None if never run)
/// * `interval_secs` - Seconds between cycles
///
/// # Returns
/// `true` when a new cycle is due (or none has run yet)
pub fn interval_elapsed(last_run: Option<DateTime<Utc>>, interval_secs: u64) -> bool {
    match last_run {
        Some(last) => {
            let elapsed = Utc::now() - last;
            elapsed.num_seconds() >= interval_secs as i64
        }
        None => true, // Never run, so the first cycle is due immediately
    }
}
