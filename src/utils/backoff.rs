//! Delay schedules for retry loops.

use crate::constants::MAX_BACKOFF_DELAY_MS;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

/// Delays to sleep between `attempts` tries of an operation.
///
/// Yields `attempts - 1` entries. A zero `first` delay retries immediately;
/// otherwise delays grow exponentially from `first` and are capped at
/// `max(first, 500ms)`.
///
/// ```rust
/// use ipfs_update::utils::backoff::retry_delays;
/// use std::time::Duration;
///
/// assert_eq!(retry_delays(Duration::ZERO, 3), vec![Duration::ZERO; 2]);
/// assert_eq!(retry_delays(Duration::from_millis(100), 1), Vec::<Duration>::new());
/// ```
#[must_use]
pub fn retry_delays(first: Duration, attempts: u32) -> Vec<Duration> {
    let count = attempts.saturating_sub(1) as usize;
    if first.is_zero() {
        return vec![Duration::ZERO; count];
    }

    let first_ms = u64::try_from(first.as_millis()).unwrap_or(u64::MAX);
    let cap = Duration::from_millis(first_ms.max(MAX_BACKOFF_DELAY_MS));
    // ExponentialBackoff yields base^n * factor; base 2 with factor first/2 gives first, 2*first, ...
    ExponentialBackoff::from_millis(2)
        .factor((first_ms / 2).max(1))
        .max_delay(cap)
        .take(count)
        .collect()
}

/// Linearly increasing delays: `step`, `2*step`, ... for `attempts` polls.
#[must_use]
pub fn linear_delays(step: Duration, attempts: u32) -> Vec<Duration> {
    (1..=attempts).map(|i| step * i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_retries_immediately() {
        let delays = retry_delays(Duration::ZERO, 4);
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(Duration::is_zero));
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let delays = retry_delays(Duration::from_millis(100), 5);
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
    }

    #[test]
    fn test_single_attempt_has_no_delay() {
        assert!(retry_delays(Duration::from_secs(1), 1).is_empty());
        assert!(retry_delays(Duration::from_secs(1), 0).is_empty());
    }

    #[test]
    fn test_linear_delays() {
        assert_eq!(
            linear_delays(Duration::from_millis(100), 3),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(300)]
        );
    }
}
