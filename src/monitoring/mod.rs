//! Resource Monitoring Module
//!
//! Samples host utilization in the background while a test run executes.
//!
//! # Components
//!
//! - [`Probe`]: captures [`HostInfo`] and [`Sample`] snapshots
//! - [`Pacer`]: cadence between samples
//! - [`Monitor`]: start/stop lifecycle; [`SamplingMonitor`] is the thread-backed default
//! - [`ResourceSummary`]: report figures over a sample history

pub mod monitor;
pub mod pacer;
pub mod probe;
pub mod summary;

pub use monitor::{
    Monitor, MonitorError, NullMonitor, SamplingMonitor, DEFAULT_INTERVAL, DEFAULT_SHUTDOWN_GRACE,
};
pub use pacer::{FixedInterval, Pacer, Pause};
pub use probe::{HostInfo, Probe, Sample, SystemProbe};
pub use summary::ResourceSummary;
