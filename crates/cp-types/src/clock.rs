use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Injectable millisecond-precision time source (spec §6 `Clock`
/// collaborator).
///
/// Every component takes a `Clock` at construction time instead of calling
/// `Utc::now()` directly, so tests can drive the second-by-second and
/// millisecond-by-millisecond scenarios in spec §8 deterministically.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Current UTC calendar date, used for quota daily-reset bookkeeping.
    fn today(&self) -> chrono::NaiveDate {
        epoch_ms_to_date(self.now_ms())
    }
}

fn epoch_ms_to_date(ms: i64) -> chrono::NaiveDate {
    chrono::DateTime::from_timestamp_millis(ms)
        .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).expect("epoch is valid"))
        .date_naive()
}

/// Production `Clock` backed by the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Test `Clock` whose time only advances when told to.
///
/// Scenario S1 in spec §8 pushes health checks "at t=1,2,3s"; a
/// `ManualClock` lets a test express that literally instead of sleeping
/// wall-clock seconds.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given Unix epoch milliseconds.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Advances the clock by `delta_ms` milliseconds and returns the new time.
    pub fn advance_ms(&self, delta_ms: i64) -> i64 {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }

    /// Sets the clock to an absolute Unix epoch millisecond value.
    pub fn set_ms(&self, ms: i64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_by_delta() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(2_500);
        assert_eq!(clock.now_ms(), 3_500);
    }

    #[test]
    fn today_tracks_advanced_time() {
        let clock = ManualClock::new(0);
        let day0 = clock.today();
        clock.advance_ms(1000 * 60 * 60 * 24 * 2);
        let day2 = clock.today();
        assert!(day2 > day0);
    }
}
