//! Spacing between refreshes.
//!
//! The interval starts at `max(min_interval, 100ms)` and doubles after every
//! pending poll, clamped to a ceiling derived from the timeout:
//! `max(min_interval, min(timeout / 10, 10s))`. The sequence never shrinks
//! and never drops below `min_interval`, and a short timeout still gets a
//! handful of polls while a long one gets proportionally more.

use std::time::Duration;

/// Smallest interval the schedule starts from.
pub const SEED_INTERVAL: Duration = Duration::from_millis(100);

/// Absolute ceiling on the interval, whatever the timeout.
pub const MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Fraction of the timeout used as the per-wait ceiling.
const TIMEOUT_DIVISOR: u32 = 10;

/// Non-decreasing poll interval sequence for one wait.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    current: Duration,
    ceiling: Duration,
}

impl PollSchedule {
    /// Schedule for a wait with the given floor and timeout.
    #[must_use]
    pub fn new(min_interval: Duration, timeout: Duration) -> Self {
        let ceiling = (timeout / TIMEOUT_DIVISOR)
            .min(MAX_INTERVAL)
            .max(min_interval);
        let current = min_interval.max(SEED_INTERVAL).min(ceiling);

        Self { current, ceiling }
    }

    /// Interval to sleep after a pending poll; grows for the next call.
    pub fn next_interval(&mut self) -> Duration {
        let interval = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        interval
    }

    /// Interval to sleep while confirming a repeated target; does not grow.
    #[must_use]
    pub fn steady_interval(&self) -> Duration {
        self.current
    }

    /// The per-wait ceiling.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_growth_from_seed() {
        let mut schedule = PollSchedule::new(Duration::ZERO, Duration::from_secs(600));
        let intervals: Vec<_> = (0..10).map(|_| schedule.next_interval()).collect();

        assert_eq!(intervals[0], Duration::from_millis(100));
        assert_eq!(intervals[1], Duration::from_millis(200));
        assert_eq!(intervals[2], Duration::from_millis(400));
        assert_eq!(intervals[9], MAX_INTERVAL);
    }

    #[rstest]
    #[case(Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(1))]
    #[case(Duration::from_secs(1), Duration::ZERO, Duration::from_millis(100))]
    #[case(Duration::from_secs(60), Duration::ZERO, Duration::from_secs(6))]
    #[case(Duration::from_secs(3600), Duration::ZERO, MAX_INTERVAL)]
    #[case(Duration::from_secs(3600), Duration::from_secs(30), Duration::from_secs(30))]
    fn test_ceiling(
        #[case] timeout: Duration,
        #[case] min_interval: Duration,
        #[case] expected: Duration,
    ) {
        assert_eq!(PollSchedule::new(min_interval, timeout).ceiling(), expected);
    }

    #[test]
    fn test_min_interval_above_timeout_share_holds_steady() {
        let mut schedule = PollSchedule::new(Duration::from_secs(1), Duration::from_secs(5));
        for _ in 0..8 {
            assert_eq!(schedule.next_interval(), Duration::from_secs(1));
        }
    }

    #[test]
    fn test_steady_interval_does_not_grow() {
        let mut schedule = PollSchedule::new(Duration::ZERO, Duration::from_secs(60));
        schedule.next_interval();
        let steady = schedule.steady_interval();
        assert_eq!(schedule.steady_interval(), steady);
        assert!(schedule.next_interval() >= steady);
    }

    proptest! {
        #[test]
        fn prop_intervals_non_decreasing_and_floored(
            min_ms in 0u64..20_000,
            timeout_ms in 1u64..3_600_000,
            polls in 1usize..64,
        ) {
            let min_interval = Duration::from_millis(min_ms);
            let mut schedule =
                PollSchedule::new(min_interval, Duration::from_millis(timeout_ms));
            let mut previous = Duration::ZERO;

            for _ in 0..polls {
                let interval = schedule.next_interval();
                prop_assert!(interval >= previous);
                prop_assert!(interval >= min_interval);
                prop_assert!(interval <= schedule.ceiling());
                previous = interval;
            }
        }
    }
}
