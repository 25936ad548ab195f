//! Run Collector
//!
//! [`TimeKeeper`] owns every timer and the monitor for one test run, and
//! hands itself to the writer chain exactly once when the run ends.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use thiserror::Error;

use super::calibration::{calibrate, Calibration};
use super::config::KeeperConfig;
use super::data::{RunData, SystemData};
use super::extensions::{Extensions, MonitorFactory};
use crate::monitoring::{HostInfo, Monitor, MonitorError, Sample};
use crate::output::Writer;
use crate::timing::{Clock, Timer, TimerError};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No timer requested yet
    Created,
    /// Timers are being recorded
    Running,
    /// The writer chain is executing
    Finalizing,
    /// All writers have run
    Done,
}

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("run has already been finalized")]
    AlreadyFinalized,
}

/// Run-scoped aggregator of timers, monitor output, and report lines.
///
/// All methods take `&self`, so one keeper can be shared between test
/// threads behind an `Arc`.
pub struct TimeKeeper {
    config: KeeperConfig,
    clock: Arc<dyn Clock>,
    calibration: Calibration,
    timers: Mutex<Vec<Arc<Timer>>>,
    monitor_factory: MonitorFactory,
    monitor: Mutex<Option<Box<dyn Monitor>>>,
    host_info: Mutex<Option<HostInfo>>,
    writer: Mutex<Option<Box<dyn Writer>>>,
    writers: Mutex<Vec<Box<dyn Writer>>>,
    report: Mutex<Vec<String>>,
    phase: Mutex<Phase>,
}

impl TimeKeeper {
    pub fn new(config: KeeperConfig) -> Self {
        Self::with_extensions(config, Extensions::default())
    }

    /// Creates a keeper with code-level hooks. Calibration runs here, using
    /// the extension clock.
    pub fn with_extensions(config: KeeperConfig, extensions: Extensions) -> Self {
        let Extensions {
            clock,
            writer,
            writers,
            monitor,
        } = extensions;

        let calibration = calibrate(&clock, &config.calibration);

        let monitor_factory = monitor.unwrap_or_else(|| {
            let monitor_config = config.monitor.clone();
            Box::new(move || monitor_config.build()) as MonitorFactory
        });

        Self {
            config,
            clock,
            calibration,
            timers: Mutex::new(Vec::new()),
            monitor_factory,
            monitor: Mutex::new(None),
            host_info: Mutex::new(None),
            writer: Mutex::new(writer),
            writers: Mutex::new(writers),
            report: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Created),
        }
    }

    /// Creates and registers a new timer.
    pub fn get_timer(&self, test_name: impl Into<String>, test_version: i64) -> Arc<Timer> {
        let timer = Arc::new(Timer::with_clock(
            Some(test_name.into()),
            test_version,
            Arc::clone(&self.clock),
        ));

        {
            let mut phase = lock(&self.phase);
            match *phase {
                Phase::Created => *phase = Phase::Running,
                Phase::Running => {}
                Phase::Finalizing | Phase::Done => warn!(
                    "Timer '{}' requested after finalize; writers may not see it",
                    timer.test_name().unwrap_or_default()
                ),
            }
        }

        lock(&self.timers).push(Arc::clone(&timer));
        timer
    }

    /// Times `f` under a new timer and returns its result.
    pub fn time<T>(
        &self,
        test_name: impl Into<String>,
        test_version: i64,
        f: impl FnOnce() -> T,
    ) -> Result<T, KeeperError> {
        let timer = self.get_timer(test_name, test_version);
        timer.start()?;
        let result = f();
        timer.stop();
        Ok(result)
    }

    /// Starts background sampling.
    pub fn start_monitor(&self) -> Result<(), KeeperError> {
        if matches!(self.phase(), Phase::Finalizing | Phase::Done) {
            return Err(KeeperError::AlreadyFinalized);
        }

        let mut monitor = lock(&self.monitor);
        monitor
            .get_or_insert_with(|| (self.monitor_factory)())
            .start()?;
        Ok(())
    }

    /// Stops background sampling and drains outstanding samples. A no-op
    /// when no monitor exists.
    pub fn stop_monitor(&self) -> Result<(), MonitorError> {
        match lock(&self.monitor).as_mut() {
            Some(monitor) => monitor.stop(),
            None => Ok(()),
        }
    }

    /// Whether `start_monitor` has created a monitor for this run.
    pub fn monitored(&self) -> bool {
        lock(&self.monitor).is_some()
    }

    /// Host description.
    ///
    /// Without a started monitor, a throwaway one captures it once and the
    /// result is kept for later calls.
    pub fn sys_info(&self) -> Option<HostInfo> {
        if let Some(monitor) = lock(&self.monitor).as_mut() {
            return monitor.sys_info();
        }

        let mut cached = lock(&self.host_info);
        if cached.is_none() {
            *cached = (self.monitor_factory)().sys_info();
        }
        cached.clone()
    }

    /// Samples drained so far; empty until the monitor has been stopped.
    pub fn sys_state_history(&self) -> Vec<Sample> {
        lock(&self.monitor)
            .as_ref()
            .map(|monitor| monitor.sys_state_history().to_vec())
            .unwrap_or_default()
    }

    /// Appends a line to the human-readable report.
    pub fn report_line(&self, line: impl Into<String>) {
        lock(&self.report).push(line.into());
    }

    pub fn report(&self) -> Vec<String> {
        lock(&self.report).clone()
    }

    /// Writes every report line, newline-terminated, to `out`.
    pub fn write_report(&self, out: &mut impl io::Write) -> io::Result<()> {
        for line in self.report() {
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }

    /// Snapshot of the run. Built fresh on every call.
    pub fn data(&self) -> RunData {
        RunData {
            system: SystemData {
                info: self.sys_info(),
                state_history: self.sys_state_history(),
            },
            function_timers: lock(&self.timers).iter().map(|t| t.to_record()).collect(),
            calibration: self.calibration.clone(),
            report: self.report(),
        }
    }

    /// Timers in creation order.
    pub fn timers(&self) -> Vec<Arc<Timer>> {
        lock(&self.timers).clone()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Ends the run: stops the monitor, then runs the writer chain.
    ///
    /// Chain order is the primary writer, the configured writers, then the
    /// extension writers. Writer failures and panics become report lines and
    /// never stop later writers. A monitor that fails to shut down is
    /// reported the same way, and its error is returned after the chain ran.
    pub fn finalize(&self) -> Result<(), KeeperError> {
        {
            let mut phase = lock(&self.phase);
            if matches!(*phase, Phase::Finalizing | Phase::Done) {
                return Err(KeeperError::AlreadyFinalized);
            }
            *phase = Phase::Finalizing;
        }

        let shutdown = self.stop_monitor();
        if let Err(e) = &shutdown {
            warn!("Monitor shutdown failed: {}", e);
            self.report_line(format!("monitor shutdown failed: {}", e));
        }

        let chain = self.resolve_writers();
        info!("Running {} writer(s)", chain.len());

        for writer in &chain {
            self.run_writer(writer.as_ref());
        }

        *lock(&self.phase) = Phase::Done;
        info!("Run finalized with {} timer(s)", lock(&self.timers).len());

        shutdown.map_err(KeeperError::from)
    }

    fn resolve_writers(&self) -> Vec<Box<dyn Writer>> {
        let primary = lock(&self.writer)
            .take()
            .unwrap_or_else(|| self.config.output.primary_writer());

        let mut chain = vec![primary];
        chain.extend(self.config.output.additional_writers());
        chain.append(&mut lock(&self.writers));
        chain
    }

    fn run_writer(&self, writer: &dyn Writer) {
        let name = writer.name().to_string();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| writer.finalize(self)));
        let reason = match outcome {
            Ok(Ok(())) => {
                info!("Writer '{}' finished", name);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        warn!("Writer '{}' failed: {}", name, reason);
        self.report_line(format!("write failed: {}: {}", name, reason));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Locks `mutex`, recovering the data if a writer panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::NullMonitor;
    use crate::output::WriterError;
    use crate::timing::SteppingClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn quiet_config() -> KeeperConfig {
        let mut config = KeeperConfig::default();
        config.output.report = false;
        config
    }

    fn keeper(extensions: Extensions) -> TimeKeeper {
        TimeKeeper::with_extensions(
            quiet_config(),
            extensions.with_monitor(|| Box::new(NullMonitor)),
        )
    }

    struct Counting(Arc<AtomicUsize>);

    impl Writer for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn finalize(&self, keeper: &TimeKeeper) -> Result<(), WriterError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            keeper.report_line("counted");
            Ok(())
        }
    }

    struct Failing;

    impl Writer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn finalize(&self, _keeper: &TimeKeeper) -> Result<(), WriterError> {
            Err(WriterError::Other("disk full".to_string()))
        }
    }

    struct Panicking;

    impl Writer for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn finalize(&self, _keeper: &TimeKeeper) -> Result<(), WriterError> {
            panic!("boom")
        }
    }

    struct Stuck;

    impl Monitor for Stuck {
        fn start(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), MonitorError> {
            Err(MonitorError::ShutdownFailed {
                waited: std::time::Duration::from_millis(10),
            })
        }

        fn sys_info(&mut self) -> Option<HostInfo> {
            None
        }

        fn sys_state_history(&self) -> &[Sample] {
            &[]
        }
    }

    /// Monitor that never samples but knows its host.
    struct Described;

    impl Monitor for Described {
        fn start(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }

        fn sys_info(&mut self) -> Option<HostInfo> {
            Some(HostInfo::new(2, 1, 0, 0, "described", 1, "TestOS", "1.0"))
        }

        fn sys_state_history(&self) -> &[Sample] {
            &[]
        }
    }

    #[test]
    fn test_timers_in_creation_order() {
        let keeper = keeper(Extensions::default());
        assert_eq!(keeper.phase(), Phase::Created);

        keeper.get_timer("a", 0);
        keeper.get_timer("b", 1);
        keeper.get_timer("a", 2);

        assert_eq!(keeper.phase(), Phase::Running);
        let names: Vec<(String, i64)> = keeper
            .data()
            .function_timers
            .into_iter()
            .map(|r| (r.test_name.unwrap(), r.test_version))
            .collect();
        let expected: Vec<(String, i64)> = vec![
            ("a".to_string(), 0),
            ("b".to_string(), 1),
            ("a".to_string(), 2),
        ];
        assert_eq!(names, expected);
    }

    #[test]
    fn test_calibration_excluded_from_timers() {
        let clock: Arc<dyn Clock> = Arc::new(SteppingClock::new(1_000, 10));
        let keeper = keeper(Extensions::default().with_clock(clock));

        assert_eq!(keeper.calibration().runs.len(), 15);
        assert_eq!(keeper.calibration().mean, 10);
        assert!(keeper.data().function_timers.is_empty());
    }

    #[test]
    fn test_time_helper() {
        let clock: Arc<dyn Clock> = Arc::new(SteppingClock::new(1_000, 250));
        let keeper = keeper(Extensions::default().with_clock(clock));

        let value = keeper.time("helper", 3, || 42).unwrap();
        assert_eq!(value, 42);

        let record = &keeper.data().function_timers[0];
        assert_eq!(record.runtime_ns(), Some(250));
        assert_eq!(record.test_version, 3);
    }

    #[test]
    fn test_concurrent_get_timer() {
        let keeper = Arc::new(keeper(Extensions::default()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let keeper = Arc::clone(&keeper);
                thread::spawn(move || {
                    for j in 0..25 {
                        keeper.get_timer(format!("t{}", i), j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(keeper.timers().len(), 200);
    }

    #[test]
    fn test_stop_monitor_without_monitor() {
        let keeper = keeper(Extensions::default());
        assert!(!keeper.monitored());
        keeper.stop_monitor().unwrap();
        assert!(keeper.sys_state_history().is_empty());
    }

    #[test]
    fn test_host_info_without_monitoring() {
        let built = Arc::new(AtomicUsize::new(0));
        let factory_built = Arc::clone(&built);
        let keeper = TimeKeeper::with_extensions(
            quiet_config(),
            Extensions::default().with_monitor(move || {
                factory_built.fetch_add(1, Ordering::SeqCst);
                Box::new(Described)
            }),
        );

        let first = keeper.data();
        let second = keeper.data();

        assert_eq!(first.system.info.as_ref().unwrap().hostname, "described");
        assert_eq!(first, second);
        assert!(!keeper.monitored());
        assert_eq!(built.load(Ordering::SeqCst), 1);

        keeper.start_monitor().unwrap();
        assert!(keeper.monitored());
    }

    #[test]
    fn test_start_monitor_after_finalize() {
        let keeper = keeper(Extensions::default());
        keeper.finalize().unwrap();

        assert!(matches!(
            keeper.start_monitor(),
            Err(KeeperError::AlreadyFinalized)
        ));
    }

    #[test]
    fn test_finalize_twice() {
        let keeper = keeper(Extensions::default());
        keeper.finalize().unwrap();
        assert_eq!(keeper.phase(), Phase::Done);
        assert!(matches!(
            keeper.finalize(),
            Err(KeeperError::AlreadyFinalized)
        ));
    }

    #[test]
    fn test_chain_order_and_isolation() {
        let count = Arc::new(AtomicUsize::new(0));
        let keeper = keeper(
            Extensions::default()
                .with_writer(Failing)
                .add_writer(Panicking)
                .add_writer(Counting(Arc::clone(&count))),
        );

        keeper.finalize().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            keeper.report(),
            vec![
                "write failed: failing: disk full".to_string(),
                "write failed: panicking: panicked: boom".to_string(),
                "counted".to_string(),
            ]
        );
    }

    #[test]
    fn test_writers_run_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let keeper = keeper(Extensions::default().add_writer(Counting(Arc::clone(&count))));

        keeper.finalize().unwrap();
        let _ = keeper.finalize();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_failure_still_runs_writers() {
        let count = Arc::new(AtomicUsize::new(0));
        let keeper = TimeKeeper::with_extensions(
            quiet_config(),
            Extensions::default()
                .with_monitor(|| Box::new(Stuck))
                .add_writer(Counting(Arc::clone(&count))),
        );
        keeper.start_monitor().unwrap();

        let err = keeper.finalize().unwrap_err();

        assert!(matches!(
            err,
            KeeperError::Monitor(MonitorError::ShutdownFailed { .. })
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(keeper.report()[0].starts_with("monitor shutdown failed"));
        assert_eq!(keeper.phase(), Phase::Done);
    }

    #[test]
    fn test_finalize_with_huge_interval() {
        // Skips validation: the settings are built in code.
        let mut config = quiet_config();
        config.monitor.interval_secs = 1.0e19;
        config.monitor.shutdown_grace_secs = 1.0e19;
        let keeper = TimeKeeper::with_extensions(config, Extensions::default());

        keeper.start_monitor().unwrap();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| keeper.finalize()));

        assert!(matches!(outcome, Ok(Ok(()))));
        assert_eq!(keeper.phase(), Phase::Done);
    }

    #[test]
    fn test_data_idempotent_after_finalize() {
        let keeper = keeper(Extensions::default());
        let timer = keeper.get_timer("t", 0);
        timer.start().unwrap();
        timer.stop();
        keeper.finalize().unwrap();

        assert_eq!(keeper.data(), keeper.data());
    }

    #[test]
    fn test_write_report() {
        let keeper = keeper(Extensions::default());
        keeper.report_line("first");
        keeper.report_line(String::from("second"));

        let mut out = Vec::new();
        keeper.write_report(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_default_primary_writer_reports() {
        let keeper = TimeKeeper::with_extensions(
            KeeperConfig::default(),
            Extensions::default().with_monitor(|| Box::new(NullMonitor)),
        );
        keeper.get_timer("t", 0);
        keeper.finalize().unwrap();

        assert_eq!(keeper.report()[0], "timekeeper: 1 timer(s)");
    }
}
