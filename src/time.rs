//! Wall-clock helpers.
//!
//! Timer due times are absolute points in time expressed as floating point
//! seconds since the UNIX epoch, so they can be computed with plain
//! arithmetic (`now() + 0.1`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current time in seconds since 1970-01-01 00:00:00 UTC.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Time left until `due`, or `None` if `due` is not in the future. Deadlines
/// too far out for a [`Duration`] saturate at [`Duration::MAX`].
pub(crate) fn remaining(due: f64) -> Option<Duration> {
    let delta = due - now();

    if delta > 0.0 {
        Some(Duration::try_from_secs_f64(delta).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_far_deadlines() {
        assert_eq!(remaining(now() + 1e20), Some(Duration::MAX));
        assert_eq!(remaining(f64::INFINITY), Some(Duration::MAX));
    }

    #[test]
    fn past_deadline_has_nothing_remaining() {
        assert_eq!(remaining(now() - 1.0), None);
        assert_eq!(remaining(f64::NAN), None);
    }
}
