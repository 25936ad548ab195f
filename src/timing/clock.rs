//! Timestamp Sources
//!
//! Every timer and sample reads time through the [`Clock`] trait so runs can
//! be replayed deterministically in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use once_cell::sync::Lazy;

/// Process-wide pairing of a monotonic instant with the wall clock.
///
/// All [`SystemClock`] readings are offsets from this anchor, so they are
/// monotonic within a process while still being comparable to Unix time.
static ANCHOR: Lazy<(Instant, u64)> = Lazy::new(|| (Instant::now(), wall_clock_ns()));

/// A source of nanosecond timestamps.
///
/// Implementations must never return 0, which timers reserve for
/// "not recorded".
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time in nanoseconds.
    fn now_ns(&self) -> u64;
}

/// Wall-anchored monotonic clock used by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        let (anchor, base) = *ANCHOR;
        let elapsed = u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX);
        base.saturating_add(elapsed)
    }
}

/// Deterministic clock that advances by a fixed step on every reading.
///
/// The first reading returns `start`, the next `start + step`, and so on.
///
/// # Example
///
/// ```rust
/// use timekeeper::timing::{Clock, SteppingClock};
///
/// let clock = SteppingClock::new(1_000, 500);
/// assert_eq!(clock.now_ns(), 1_000);
/// assert_eq!(clock.now_ns(), 1_500);
/// ```
#[derive(Debug)]
pub struct SteppingClock {
    next: AtomicU64,
    step: u64,
}

impl SteppingClock {
    /// Creates a clock starting at `start` (clamped to at least 1).
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_ns(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Nanoseconds since the Unix epoch according to the wall clock.
pub fn wall_clock_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now_ns();
        thread::sleep(Duration::from_millis(2));
        let second = clock.now_ns();

        assert!(second > first);
    }

    #[test]
    fn test_system_clock_tracks_unix_time() {
        let clock = SystemClock;
        let wall = wall_clock_ns();
        let reading = clock.now_ns();

        // Anchored to the same epoch, so the two stay within a few seconds.
        let diff = reading.abs_diff(wall);
        assert!(diff < 5_000_000_000, "drifted by {} ns", diff);
    }

    #[test]
    fn test_stepping_clock_sequence() {
        let clock = SteppingClock::new(10, 5);
        assert_eq!(clock.now_ns(), 10);
        assert_eq!(clock.now_ns(), 15);
        assert_eq!(clock.now_ns(), 20);
    }

    #[test]
    fn test_stepping_clock_never_zero() {
        let clock = SteppingClock::new(0, 1);
        assert_eq!(clock.now_ns(), 1);
    }
}
