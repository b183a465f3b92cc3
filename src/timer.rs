//! High-resolution monotonic timing.
//!
//! Wraps the raw monotonic clock in the start/stop/duration shape the driver
//! needs. Ticks are clock readings in nanoseconds; the tick frequency is
//! queried once at construction and assumed stable for the process lifetime.
//! The timer is single-shot per run: one start, one stop, no nesting.

use crate::error::{last_errno, HarnessError, Result};
use std::mem;

/// Ticks per second of `CLOCK_MONOTONIC_RAW` readings.
const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A pair of counter readings plus the frequency needed to scale them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSample {
    pub start_tick: u64,
    pub end_tick: u64,
    pub tick_frequency: u64,
}

impl TimerSample {
    /// Elapsed microseconds, multiply-before-divide so sub-tick fractions are
    /// not truncated away early. Never negative: a stopped-before-started
    /// sample saturates to zero.
    pub fn duration_us(&self) -> u64 {
        let ticks = self.end_tick.saturating_sub(self.start_tick) as u128;
        (ticks * 1_000_000 / self.tick_frequency as u128) as u64
    }
}

/// Single-shot stopwatch over the monotonic counter.
pub struct HighResolutionTimer {
    frequency: u64,
    start_tick: u64,
    end_tick: u64,
}

impl HighResolutionTimer {
    /// Probes the monotonic clock; fails with `TimerFrequencyUnavailable`
    /// before any start/stop is reachable if the counter is missing or
    /// reports an unusable resolution.
    pub fn new() -> Result<Self> {
        unsafe {
            let mut res: libc::timespec = mem::zeroed();
            if libc::clock_getres(libc::CLOCK_MONOTONIC_RAW, &mut res) != 0 {
                return Err(HarnessError::TimerFrequencyUnavailable {
                    errno: Some(last_errno()),
                });
            }
            if res.tv_sec == 0 && res.tv_nsec == 0 {
                // A zero-resolution counter cannot advance.
                return Err(HarnessError::TimerFrequencyUnavailable { errno: None });
            }

            let mut probe: libc::timespec = mem::zeroed();
            if libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut probe) != 0 {
                return Err(HarnessError::TimerFrequencyUnavailable {
                    errno: Some(last_errno()),
                });
            }
        }

        Ok(HighResolutionTimer {
            frequency: NANOS_PER_SECOND,
            start_tick: 0,
            end_tick: 0,
        })
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn start(&mut self) {
        self.start_tick = current_tick();
    }

    pub fn stop(&mut self) {
        self.end_tick = current_tick();
    }

    pub fn sample(&self) -> TimerSample {
        TimerSample {
            start_tick: self.start_tick,
            end_tick: self.end_tick,
            tick_frequency: self.frequency,
        }
    }

    pub fn duration_us(&self) -> u64 {
        self.sample().duration_us()
    }
}

fn current_tick() -> u64 {
    // The clock was validated at construction; a read cannot fail afterwards
    // short of the kernel removing the clock out from under us.
    unsafe {
        let mut ts: libc::timespec = mem::zeroed();
        libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
        ts.tv_sec as u64 * NANOS_PER_SECOND + ts.tv_nsec as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_succeeds_on_host() {
        let timer = HighResolutionTimer::new().unwrap();
        assert_eq!(timer.frequency(), NANOS_PER_SECOND);
    }

    #[test]
    fn test_back_to_back_duration_is_tiny() {
        let mut timer = HighResolutionTimer::new().unwrap();
        timer.start();
        timer.stop();
        // Bounded by counter resolution plus scheduling noise; tens of
        // milliseconds for two adjacent reads would mean a broken clock.
        assert!(timer.duration_us() < 10_000);
    }

    #[test]
    fn test_duration_never_negative() {
        let sample = TimerSample {
            start_tick: 100,
            end_tick: 50,
            tick_frequency: NANOS_PER_SECOND,
        };
        assert_eq!(sample.duration_us(), 0);
    }

    #[test]
    fn test_duration_scales_before_dividing() {
        // 1500 ticks at 1 GHz is 1.5us; multiply-first keeps the microsecond,
        // divide-first would truncate to zero.
        let sample = TimerSample {
            start_tick: 0,
            end_tick: 1_500,
            tick_frequency: NANOS_PER_SECOND,
        };
        assert_eq!(sample.duration_us(), 1);
    }

    #[test]
    fn test_measures_real_work() {
        let mut timer = HighResolutionTimer::new().unwrap();
        timer.start();
        std::thread::sleep(std::time::Duration::from_millis(2));
        timer.stop();
        assert!(timer.duration_us() >= 2_000);
    }
}
