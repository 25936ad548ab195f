//! Sampling Cadence
//!
//! The sampler thread calls a [`Pacer`] between samples. Pacers wait on the
//! stop channel rather than sleeping blindly, so a stop request wakes the
//! sampler immediately instead of after the remainder of the interval.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// What the sampler should do after a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Take the next sample
    Resume,
    /// Termination was signaled; exit the loop
    Stop,
}

/// Decides how long the sampler waits between samples.
pub trait Pacer: Send + 'static {
    /// Blocks until the next sample is due or `stop` fires.
    fn pause(&mut self, stop: &Receiver<()>) -> Pause;
}

/// Fixed-rate schedule.
///
/// Deadlines advance by `interval` from the first pause, so time spent
/// producing a sample does not accumulate as drift. When the sampler falls
/// behind by more than one interval the schedule restarts from now instead
/// of bursting to catch up.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Pacer for FixedInterval {
    fn pause(&mut self, stop: &Receiver<()>) -> Pause {
        let now = Instant::now();
        let due = self
            .next_due
            .and_then(|due| due.checked_add(self.interval))
            .filter(|due| *due > now)
            .or_else(|| now.checked_add(self.interval));
        self.next_due = due;

        // Past the end of representable time: only a stop ends the wait.
        let Some(due) = due else {
            let _ = stop.recv();
            return Pause::Stop;
        };

        match stop.recv_timeout(due.saturating_duration_since(now)) {
            Err(RecvTimeoutError::Timeout) => Pause::Resume,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Pause::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::thread;

    #[test]
    fn test_fixed_interval_waits() {
        let (_stop_tx, stop_rx) = channel::<()>();
        let mut pacer = FixedInterval::new(Duration::from_millis(30));

        let started = Instant::now();
        assert_eq!(pacer.pause(&stop_rx), Pause::Resume);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_fixed_interval_stops_early() {
        let (stop_tx, stop_rx) = channel::<()>();
        let mut pacer = FixedInterval::new(Duration::from_secs(60));

        let signal = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop_tx.send(()).unwrap();
        });

        let started = Instant::now();
        assert_eq!(pacer.pause(&stop_rx), Pause::Stop);
        assert!(started.elapsed() < Duration::from_secs(5));
        signal.join().unwrap();
    }

    #[test]
    fn test_fixed_interval_stops_on_disconnect() {
        let (stop_tx, stop_rx) = channel::<()>();
        drop(stop_tx);

        let mut pacer = FixedInterval::new(Duration::from_secs(60));
        assert_eq!(pacer.pause(&stop_rx), Pause::Stop);
    }

    #[test]
    fn test_unrepresentable_interval_waits_for_stop() {
        let (stop_tx, stop_rx) = channel::<()>();
        let mut pacer = FixedInterval::new(Duration::MAX);

        let signal = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop_tx.send(()).unwrap();
        });

        assert_eq!(pacer.pause(&stop_rx), Pause::Stop);
        signal.join().unwrap();
    }

    #[test]
    fn test_fixed_interval_absorbs_work_time() {
        let (_stop_tx, stop_rx) = channel::<()>();
        let interval = Duration::from_millis(40);
        let mut pacer = FixedInterval::new(interval);

        let started = Instant::now();
        pacer.pause(&stop_rx);
        // Simulated sample production eats part of the next interval.
        thread::sleep(Duration::from_millis(15));
        pacer.pause(&stop_rx);

        let elapsed = started.elapsed();
        assert!(elapsed >= interval * 2);
        assert!(elapsed < interval * 2 + Duration::from_millis(15) + Duration::from_millis(200));
    }
}
