//! Time sources for the guardrail monitor
//!
//! Every cooldown and retention decision compares against "now". The
//! monitor asks a [`Clock`] for it so tests can move time forward without
//! sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Provider of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock with millisecond resolution
///
/// Used by tests and demos to simulate the passage of time.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    /// Move the clock forward by a fractional number of minutes
    pub fn advance_minutes(&self, minutes: f64) {
        self.advance(minutes_to_duration(minutes));
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default()
    }
}

/// Largest span, in milliseconds, that chrono can represent as a `Duration`
const MAX_DURATION_MILLIS: f64 = (i64::MAX / 1_000) as f64;

/// Convert a (possibly fractional) minute count into a chrono duration
///
/// Out-of-range values saturate and NaN maps to zero.
pub fn minutes_to_duration(minutes: f64) -> Duration {
    let millis = (minutes * 60_000.0).round();
    if millis.is_nan() {
        return Duration::zero();
    }
    let millis = millis.clamp(-MAX_DURATION_MILLIS, MAX_DURATION_MILLIS);
    Duration::milliseconds(millis as i64)
}

/// `now - minutes`, or `None` when the result falls outside chrono's range
pub fn cutoff_before(now: DateTime<Utc>, minutes: f64) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(minutes_to_duration(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance_minutes(0.25);
        assert_eq!(clock.now(), start + Duration::seconds(15));

        clock.advance(Duration::minutes(2));
        assert_eq!(clock.now(), start + Duration::seconds(135));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::default();
        let target = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_minutes_to_duration() {
        assert_eq!(minutes_to_duration(0.5), Duration::seconds(30));
        assert_eq!(minutes_to_duration(2.0), Duration::minutes(2));
        assert_eq!(minutes_to_duration(30.0), Duration::minutes(30));
    }

    #[test]
    fn test_minutes_to_duration_saturates() {
        let huge = minutes_to_duration(1e13);
        assert!(huge > Duration::days(365 * 1_000_000));
        assert_eq!(minutes_to_duration(f64::INFINITY), minutes_to_duration(1e300));
        assert_eq!(minutes_to_duration(f64::NEG_INFINITY), -minutes_to_duration(f64::INFINITY));
        assert_eq!(minutes_to_duration(f64::NAN), Duration::zero());
    }

    #[test]
    fn test_cutoff_before_out_of_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(cutoff_before(now, 1.0), Some(now - Duration::minutes(1)));
        assert_eq!(cutoff_before(now, 1e13), None);
        assert_eq!(cutoff_before(now, -2.0), Some(now + Duration::minutes(2)));
    }
}
