//! General time utility functions

use chrono;
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Largest duration accepted from a parameter file, one year
pub const MAX_PARAM_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration.num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a number of seconds from a parameter file into a `Duration`.
///
/// Negative and non-finite values become a zero duration rather than panicking, and values are
/// capped at `MAX_PARAM_SECS`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs.min(MAX_PARAM_SECS))
    }
    else {
        Duration::from_secs(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(duration_to_seconds(chrono::Duration::milliseconds(1500)), Some(1.5));
    }

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(0.1), Duration::from_millis(100));
        assert_eq!(secs_to_duration(-1.0), Duration::from_secs(0));
        assert_eq!(secs_to_duration(std::f64::NAN), Duration::from_secs(0));
    }
}
