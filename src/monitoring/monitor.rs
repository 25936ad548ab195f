//! Background Host Monitoring
//!
//! [`SamplingMonitor`] runs a [`Probe`] on a dedicated thread for the length
//! of a test run. The thread and the monitor share nothing but two channels:
//! a one-shot stop signal going out and an unbounded sample stream coming
//! back.
//!
//! Shutdown is signal, drain, join. Because the sample channel is
//! unbounded the sampler never blocks on a push, and because draining runs
//! until the channel disconnects (the thread dropped its sender on exit),
//! every sample produced before the thread exits is collected.

use std::mem;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Once;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use thiserror::Error;

use super::pacer::{FixedInterval, Pacer, Pause};
use super::probe::{HostInfo, Probe, Sample, SystemProbe};

/// Default time between samples.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Extra time `stop` waits for the sampler beyond one interval.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

static UNAVAILABLE_NOTICE: Once = Once::new();

/// Errors raised by monitor lifecycle operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start` was called on a monitor that was already started.
    #[error("monitor was already started")]
    AlreadyStarted,

    /// The sampler thread could not be spawned.
    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The sampler did not exit before the shutdown deadline.
    #[error("sampler did not shut down within {waited:?}")]
    ShutdownFailed { waited: Duration },

    /// The sampler thread panicked.
    #[error("sampler thread panicked")]
    SamplerPanicked,
}

/// Owner of a background sampling lifecycle.
///
/// Collectors talk to monitors only through this trait, so tests and
/// embedders can substitute their own implementation.
pub trait Monitor: Send {
    /// Starts sampling. A second call fails with [`MonitorError::AlreadyStarted`].
    fn start(&mut self) -> Result<(), MonitorError>;

    /// Stops sampling and collects every outstanding sample.
    /// A no-op if sampling never started.
    fn stop(&mut self) -> Result<(), MonitorError>;

    /// Static host description, captured lazily if not already known.
    /// `None` when the host cannot be introspected.
    fn sys_info(&mut self) -> Option<HostInfo>;

    /// Samples collected so far, in production order.
    fn sys_state_history(&self) -> &[Sample];
}

/// Monitor that records nothing. Used when monitoring is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn start(&mut self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn sys_info(&mut self) -> Option<HostInfo> {
        None
    }

    fn sys_state_history(&self) -> &[Sample] {
        &[]
    }
}

/// Handles to a running sampler thread.
struct Worker<P> {
    stop: Sender<()>,
    samples: Receiver<Sample>,
    handle: JoinHandle<(P, Box<dyn Pacer>)>,
}

enum State<P> {
    /// Constructed, never started
    Idle,
    /// Sampler thread alive
    Running(Worker<P>),
    /// Sampler finished; no restart
    Stopped,
    /// Host cannot be introspected; everything is a no-op
    Unavailable,
}

/// Sampler-backed monitor.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use timekeeper::monitoring::{Monitor, SamplingMonitor};
///
/// let mut monitor = SamplingMonitor::new(Duration::from_secs(1));
/// monitor.start().unwrap();
/// // ... run the workload ...
/// monitor.stop().unwrap();
///
/// println!("{} samples", monitor.sys_state_history().len());
/// ```
pub struct SamplingMonitor<P: Probe = SystemProbe> {
    interval: Duration,
    shutdown_grace: Duration,
    probe: Option<P>,
    pacer: Option<Box<dyn Pacer>>,
    info: Option<HostInfo>,
    samples: Vec<Sample>,
    state: State<P>,
}

impl SamplingMonitor<SystemProbe> {
    /// Creates a monitor sampling the host through `sysinfo`.
    pub fn new(interval: Duration) -> Self {
        Self::with_probe(SystemProbe::new(), interval)
    }
}

impl Default for SamplingMonitor<SystemProbe> {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl<P: Probe> SamplingMonitor<P> {
    /// Creates a monitor around a custom probe.
    pub fn with_probe(probe: P, interval: Duration) -> Self {
        Self {
            interval,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            probe: Some(probe),
            pacer: None,
            info: None,
            samples: Vec::new(),
            state: State::Idle,
        }
    }

    /// Replaces the default fixed-interval cadence.
    pub fn with_pacer(mut self, pacer: impl Pacer) -> Self {
        self.pacer = Some(Box::new(pacer));
        self
    }

    /// Sets how long `stop` waits beyond one interval before giving up.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while the sampler thread is alive.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// Returns true if the host could not be introspected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.state, State::Unavailable)
    }

    /// How long `stop` waits for the sampler, or `None` when the sum does
    /// not fit in a `Duration`.
    fn shutdown_deadline(&self) -> Option<Duration> {
        self.interval.checked_add(self.shutdown_grace)
    }

    fn mark_unavailable(&mut self) {
        UNAVAILABLE_NOTICE.call_once(|| {
            info!("System monitoring is not supported on this host; continuing without it");
        });
        self.state = State::Unavailable;
    }
}

impl<P: Probe> Monitor for SamplingMonitor<P> {
    fn start(&mut self) -> Result<(), MonitorError> {
        match self.state {
            State::Idle => {}
            State::Unavailable => return Ok(()),
            State::Running(_) | State::Stopped => return Err(MonitorError::AlreadyStarted),
        }

        let Some(mut probe) = self.probe.take() else {
            return Err(MonitorError::AlreadyStarted);
        };

        if !probe.is_available() {
            self.probe = Some(probe);
            self.mark_unavailable();
            return Ok(());
        }

        if self.info.is_none() {
            self.info = Some(probe.host_info());
        }

        let pacer = self
            .pacer
            .take()
            .unwrap_or_else(|| Box::new(FixedInterval::new(self.interval)) as Box<dyn Pacer>);

        let (stop_tx, stop_rx) = channel::<()>();
        let (sample_tx, sample_rx) = channel::<Sample>();

        let handle = thread::Builder::new()
            .name("timekeeper-sampler".to_string())
            .spawn(move || sample_loop(probe, pacer, stop_rx, sample_tx))
            .map_err(MonitorError::Spawn)?;

        info!("Started system monitor (interval: {:?})", self.interval);

        self.state = State::Running(Worker {
            stop: stop_tx,
            samples: sample_rx,
            handle,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MonitorError> {
        let worker = match mem::replace(&mut self.state, State::Stopped) {
            State::Running(worker) => worker,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        // The thread may already be gone; a closed channel is fine.
        let _ = worker.stop.send(());

        // Unrepresentable deadlines mean waiting for the sampler to hang up.
        let limit = self
            .shutdown_deadline()
            .and_then(|waited| Some((waited, Instant::now().checked_add(waited)?)));
        let before = self.samples.len();

        loop {
            let received = match limit {
                Some((_, deadline)) => worker
                    .samples
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => worker
                    .samples
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(sample) => self.samples.push(sample),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let waited = limit.map(|(waited, _)| waited).unwrap_or(Duration::MAX);
                    error!(
                        "System monitor did not stop within {:?}; abandoning sampler thread",
                        waited
                    );
                    return Err(MonitorError::ShutdownFailed { waited });
                }
            }
        }

        let (probe, pacer) = worker
            .handle
            .join()
            .map_err(|_| MonitorError::SamplerPanicked)?;
        self.probe = Some(probe);
        self.pacer = Some(pacer);

        debug!("Drained {} samples during shutdown", self.samples.len() - before);
        info!("Stopped system monitor ({} samples)", self.samples.len());
        Ok(())
    }

    fn sys_info(&mut self) -> Option<HostInfo> {
        if self.is_unavailable() {
            return None;
        }

        if self.info.is_none() {
            let probe = self.probe.as_mut()?;
            if !probe.is_available() {
                self.mark_unavailable();
                return None;
            }
            self.info = Some(probe.host_info());
        }

        self.info.clone()
    }

    fn sys_state_history(&self) -> &[Sample] {
        &self.samples
    }
}

impl<P: Probe> Drop for SamplingMonitor<P> {
    fn drop(&mut self) {
        if let State::Running(worker) = &self.state {
            let _ = worker.stop.send(());
        }
    }
}

/// Body of the sampler thread.
///
/// Checks for termination before every sample, and the pacer watches the
/// same signal while waiting, so a stop is observed within one interval.
fn sample_loop<P: Probe>(
    mut probe: P,
    mut pacer: Box<dyn Pacer>,
    stop: Receiver<()>,
    samples: Sender<Sample>,
) -> (P, Box<dyn Pacer>) {
    loop {
        match stop.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if samples.send(probe.sample()).is_err() {
            break;
        }

        if pacer.pause(&stop) == Pause::Stop {
            break;
        }
    }

    (probe, pacer)
}
