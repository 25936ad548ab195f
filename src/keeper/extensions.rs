//! Extension Points
//!
//! Code-level hooks for a run: the clock, the primary writer, additional
//! writers, and the monitor implementation. Everything here is passed to
//! [`TimeKeeper::with_extensions`](super::TimeKeeper::with_extensions);
//! there is no process-wide default to mutate.

use std::sync::Arc;

use crate::monitoring::Monitor;
use crate::output::Writer;
use crate::timing::{Clock, SystemClock};

/// Builds the monitor for a run when monitoring starts.
pub type MonitorFactory = Box<dyn Fn() -> Box<dyn Monitor> + Send + Sync>;

/// Hooks supplied by the embedding test harness.
///
/// # Example
///
/// ```rust
/// use timekeeper::keeper::{Extensions, KeeperConfig, TimeKeeper};
/// use timekeeper::monitoring::NullMonitor;
/// use timekeeper::output::FileWriter;
///
/// let extensions = Extensions::default()
///     .add_writer(FileWriter::json("target/times.json"))
///     .with_monitor(|| Box::new(NullMonitor));
///
/// let keeper = TimeKeeper::with_extensions(KeeperConfig::default(), extensions);
/// # drop(keeper);
/// ```
pub struct Extensions {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) writer: Option<Box<dyn Writer>>,
    pub(crate) writers: Vec<Box<dyn Writer>>,
    pub(crate) monitor: Option<MonitorFactory>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            writer: None,
            writers: Vec::new(),
            monitor: None,
        }
    }
}

impl Extensions {
    /// Clock used by timers, calibration, and nothing else.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the primary writer (the console report by default).
    pub fn with_writer(mut self, writer: impl Writer + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Appends a writer that runs after the primary and configured writers.
    pub fn add_writer(mut self, writer: impl Writer + 'static) -> Self {
        self.writers.push(Box::new(writer));
        self
    }

    /// Replaces the monitor built from configuration.
    pub fn with_monitor(
        mut self,
        factory: impl Fn() -> Box<dyn Monitor> + Send + Sync + 'static,
    ) -> Self {
        self.monitor = Some(Box::new(factory));
        self
    }
}
