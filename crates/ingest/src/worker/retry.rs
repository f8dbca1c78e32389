//! Bounded retry with exponential backoff
//!
//! The schedule is a pure function of the attempt count so tests can verify
//! it without sleeping.

use std::time::Duration;

/// Inter-attempt delays for `max_retries` retries: doubling from
/// `base_delay`, strictly increasing.
pub fn backoff_delays(max_retries: u32, base_delay: Duration) -> Vec<Duration> {
    (0..max_retries).map(|i| base_delay * 2u32.pow(i)).collect()
}

/// Run `op` up to `1 + max_retries` times.
///
/// `op` receives the attempt number (1-based). Between failures the thread
/// sleeps the backoff delay plus up to 100ms of jitter. The final error is
/// returned once the budget is exhausted.
pub fn retry_with_backoff<T, E: std::fmt::Display>(
    max_retries: u32,
    base_delay: Duration,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let delays = backoff_delays(max_retries, base_delay);
    let mut last_error = None;

    for attempt in 1..=max_retries + 1 {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("Attempt {attempt}/{} failed: {e}", max_retries + 1);
                last_error = Some(e);
                if let Some(delay) = delays.get((attempt - 1) as usize) {
                    std::thread::sleep(*delay + Duration::from_millis(rand_jitter()));
                }
            }
        }
    }

    // The loop always records an error before exhausting its budget
    Err(last_error.unwrap())
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
