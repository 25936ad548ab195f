//! Region Timers
//!
//! A [`Timer`] measures one interval of a test run. Timers are handed out by
//! the collector as `Arc<Timer>` so the test body and the collector share the
//! same measurement; start, stop, and notes are safe to use from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::clock::{Clock, SystemClock};

/// Label used in messages for timers that carry no test name.
const UNNAMED: &str = "<unnamed>";

/// Errors raised by timer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// `start` was called on a timer that already has a start time.
    #[error("timer '{name}' was already started")]
    AlreadyStarted { name: String },
}

/// Flat export of a timer, as consumed by writers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimerRecord {
    /// Name of the measured test, absent for calibration timers
    pub test_name: Option<String>,
    /// Disambiguates repeated runs of the same test
    pub test_version: i64,
    /// Start timestamp in nanoseconds (0 = not started)
    pub start_time_ns: u64,
    /// End timestamp in nanoseconds (0 = not stopped)
    pub end_time_ns: u64,
    /// Free-form annotations
    #[serde(default)]
    pub notes: Map<String, Value>,
}

impl TimerRecord {
    /// Elapsed nanoseconds, if both ends were recorded.
    pub fn runtime_ns(&self) -> Option<u64> {
        runtime(self.start_time_ns, self.end_time_ns)
    }
}

/// A single measured interval with metadata.
///
/// # Example
///
/// ```rust
/// use timekeeper::timing::Timer;
///
/// let timer = Timer::new("test_query", 0);
/// timer.note("area", "Query");
/// timer.start().unwrap();
/// // ... measured work ...
/// timer.stop();
///
/// assert!(timer.runtime_ns().is_some());
/// ```
#[derive(Debug)]
pub struct Timer {
    test_name: Option<String>,
    test_version: i64,
    start_time_ns: AtomicU64,
    end_time_ns: AtomicU64,
    notes: Mutex<Map<String, Value>>,
    clock: Arc<dyn Clock>,
}

impl Timer {
    /// Creates a named timer reading the system clock.
    pub fn new(test_name: impl Into<String>, test_version: i64) -> Self {
        Self::with_clock(Some(test_name.into()), test_version, Arc::new(SystemClock))
    }

    /// Creates a timer with an explicit clock. `test_name` may be absent.
    pub fn with_clock(test_name: Option<String>, test_version: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            test_name,
            test_version,
            start_time_ns: AtomicU64::new(0),
            end_time_ns: AtomicU64::new(0),
            notes: Mutex::new(Map::new()),
            clock,
        }
    }

    /// Records the start time.
    ///
    /// Fails with [`TimerError::AlreadyStarted`] if the timer was started
    /// before; the original start time is kept.
    pub fn start(&self) -> Result<(), TimerError> {
        let now = self.clock.now_ns();
        self.start_time_ns
            .compare_exchange(0, now, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| TimerError::AlreadyStarted {
                name: self.label().to_string(),
            })
    }

    /// Records the end time. A second call overwrites the first.
    pub fn stop(&self) {
        self.end_time_ns.store(self.clock.now_ns(), Ordering::SeqCst);
    }

    /// Attaches a note that is exported with the timer's record.
    pub fn note(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Returns a copy of the notes recorded so far.
    pub fn notes(&self) -> Map<String, Value> {
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn test_name(&self) -> Option<&str> {
        self.test_name.as_deref()
    }

    pub fn test_version(&self) -> i64 {
        self.test_version
    }

    pub fn start_time_ns(&self) -> u64 {
        self.start_time_ns.load(Ordering::SeqCst)
    }

    pub fn end_time_ns(&self) -> u64 {
        self.end_time_ns.load(Ordering::SeqCst)
    }

    /// Returns true once `start` has succeeded.
    pub fn is_started(&self) -> bool {
        self.start_time_ns() != 0
    }

    /// Returns true once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.end_time_ns() != 0
    }

    /// Elapsed nanoseconds, or `None` until both start and stop are recorded.
    pub fn runtime_ns(&self) -> Option<u64> {
        runtime(self.start_time_ns(), self.end_time_ns())
    }

    /// Elapsed microseconds, or `None` until both start and stop are recorded.
    pub fn runtime_us(&self) -> Option<u64> {
        self.runtime_ns().map(|ns| ns / 1_000)
    }

    /// Exports the timer as a flat record.
    pub fn to_record(&self) -> TimerRecord {
        TimerRecord {
            test_name: self.test_name.clone(),
            test_version: self.test_version,
            start_time_ns: self.start_time_ns(),
            end_time_ns: self.end_time_ns(),
            notes: self.notes(),
        }
    }

    fn label(&self) -> &str {
        self.test_name.as_deref().unwrap_or(UNNAMED)
    }
}

/// `None` unless both ends are recorded and the stop follows the start.
fn runtime(start: u64, end: u64) -> Option<u64> {
    if start == 0 || end == 0 {
        return None;
    }
    end.checked_sub(start)
}
