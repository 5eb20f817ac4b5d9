//! Timer Abstractions
//!
//! The injectable time source used by the bus transport for retry windows,
//! settling delays and bus-clear pulse timing, plus a deadline helper.

use embedded_hal::delay::DelayNs;

/// Monotonic clock plus blocking delays
///
/// The transport never reads the hardware timer directly; tests substitute
/// a simulated clock whose delays advance time instantly.
pub trait TimeSource: DelayNs {
    /// Microseconds since an arbitrary fixed epoch
    fn now_us(&self) -> u64;
}

/// Deadline helper for bounded polling loops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at_us: u64,
}

impl Deadline {
    /// Deadline `timeout_ms` after the current time of `time`
    #[must_use]
    pub fn after_ms<T: TimeSource + ?Sized>(time: &T, timeout_ms: u32) -> Self {
        Self {
            at_us: time.now_us().saturating_add(u64::from(timeout_ms) * 1_000),
        }
    }

    /// Check if the deadline has passed
    #[must_use]
    pub fn expired<T: TimeSource + ?Sized>(&self, time: &T) -> bool {
        time.now_us() >= self.at_us
    }

    /// Remaining time in microseconds (zero once expired)
    #[must_use]
    pub fn remaining_us<T: TimeSource + ?Sized>(&self, time: &T) -> u64 {
        self.at_us.saturating_sub(time.now_us())
    }
}

/// Time source backed by the embassy time driver
#[cfg(feature = "embedded")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyTime;

#[cfg(feature = "embedded")]
impl DelayNs for EmbassyTime {
    fn delay_ns(&mut self, ns: u32) {
        embassy_time::block_for(embassy_time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        embassy_time::block_for(embassy_time::Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        embassy_time::block_for(embassy_time::Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(feature = "embedded")]
impl TimeSource for EmbassyTime {
    fn now_us(&self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::SimClock;

    #[test]
    fn deadline_expires_after_window() {
        let mut clock = SimClock::new();
        let deadline = Deadline::after_ms(&clock, 20);
        assert!(!deadline.expired(&clock));
        assert_eq!(deadline.remaining_us(&clock), 20_000);

        clock.delay_ms(19);
        assert!(!deadline.expired(&clock));
        assert_eq!(deadline.remaining_us(&clock), 1_000);

        clock.delay_ms(1);
        assert!(deadline.expired(&clock));
        assert_eq!(deadline.remaining_us(&clock), 0);
    }
}
