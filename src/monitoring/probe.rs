//! Host State Probes
//!
//! A [`Probe`] captures the static description of the host ([`HostInfo`])
//! and point-in-time utilization snapshots ([`Sample`]). The default
//! [`SystemProbe`] reads both through `sysinfo`.

use std::fs;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sysinfo::System;

use crate::timing::{Clock, SystemClock};

/// One point-in-time snapshot of host utilization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sample {
    /// Global CPU usage percentage (0-100)
    pub cpu_percent: f32,
    /// Current CPU frequency in MHz
    pub freq_current: u64,
    /// Available memory as a fraction of total (0-1, two decimals)
    pub mem_available_ratio: f64,
    /// When this sample was taken
    pub timestamp_ns: u64,
}

/// Static description of the machine running the tests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Logical core count
    pub threads: usize,
    /// Physical core count
    pub cores: usize,
    /// Minimum CPU frequency in MHz
    pub freq_min: u64,
    /// Maximum CPU frequency in MHz
    pub freq_max: u64,
    pub hostname: String,
    /// Total memory in bytes
    pub mem_total: u64,
    /// Operating system name
    pub os_name: String,
    /// Operating system version
    pub os_version: String,
    /// Version of this library that produced the data
    pub keeper_version: String,
    /// Fingerprint for grouping runs by machine
    pub hash: String,
}

impl HostInfo {
    /// Builds host info and derives its fingerprint from the other fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        threads: usize,
        cores: usize,
        freq_min: u64,
        freq_max: u64,
        hostname: impl Into<String>,
        mem_total: u64,
        os_name: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        let mut info = Self {
            threads,
            cores,
            freq_min,
            freq_max,
            hostname: hostname.into(),
            mem_total,
            os_name: os_name.into(),
            os_version: os_version.into(),
            keeper_version: crate::VERSION.to_string(),
            hash: String::new(),
        };
        info.hash = info.fingerprint();
        info
    }

    /// Hex SHA-256 over the machine-identifying fields.
    ///
    /// Frequencies and the library version are left out so the fingerprint
    /// survives governor changes and upgrades.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hostname.as_bytes());
        hasher.update(self.threads.to_le_bytes());
        hasher.update(self.cores.to_le_bytes());
        hasher.update(self.mem_total.to_le_bytes());
        hasher.update(self.os_name.as_bytes());
        hasher.update(self.os_version.as_bytes());

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Source of host data for a monitor.
///
/// Probes are moved onto the sampler thread while monitoring runs and handed
/// back when it stops.
pub trait Probe: Send + 'static {
    /// Returns false when the host cannot be introspected.
    fn is_available(&self) -> bool {
        true
    }

    /// Captures the static host description.
    fn host_info(&mut self) -> HostInfo;

    /// Captures one utilization snapshot.
    fn sample(&mut self) -> Sample;
}

/// Probe backed by `sysinfo`.
pub struct SystemProbe {
    system: System,
    clock: Arc<dyn Clock>,
}

impl SystemProbe {
    /// Creates a probe stamping samples with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a probe stamping samples with the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut system = System::new();
        // CPU usage is computed between two refreshes; prime the first one.
        system.refresh_cpu();
        Self { system, clock }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for SystemProbe {
    fn is_available(&self) -> bool {
        sysinfo::IS_SUPPORTED_SYSTEM
    }

    fn host_info(&mut self) -> HostInfo {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let (freq_min, freq_max) = frequency_bounds(&self.system);

        HostInfo::new(
            num_cpus::get(),
            num_cpus::get_physical(),
            freq_min,
            freq_max,
            System::host_name().unwrap_or_else(|| "unknown".to_string()),
            self.system.total_memory(),
            System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            System::os_version().unwrap_or_default(),
        )
    }

    fn sample(&mut self) -> Sample {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        Sample {
            cpu_percent: round_to(self.system.global_cpu_info().cpu_usage() as f64, 1) as f32,
            freq_current: current_frequency(&self.system),
            mem_available_ratio: memory_ratio(
                self.system.available_memory(),
                self.system.total_memory(),
            ),
            timestamp_ns: self.clock.now_ns(),
        }
    }
}

/// Mean frequency across cores, falling back to the global reading.
fn current_frequency(system: &System) -> u64 {
    let cpus = system.cpus();
    if cpus.is_empty() {
        return system.global_cpu_info().frequency();
    }
    let total: u64 = cpus.iter().map(|cpu| cpu.frequency()).sum();
    (total as f64 / cpus.len() as f64).round() as u64
}

/// Hardware frequency limits in MHz.
///
/// Linux exposes them through cpufreq; elsewhere the spread of current
/// per-core readings is the best available approximation.
fn frequency_bounds(system: &System) -> (u64, u64) {
    let from_cpufreq = |file: &str| -> Option<u64> {
        let path = format!("/sys/devices/system/cpu/cpu0/cpufreq/{}", file);
        let khz: u64 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
        Some((khz as f64 / 1_000.0).round() as u64)
    };

    if let (Some(min), Some(max)) = (
        from_cpufreq("cpuinfo_min_freq"),
        from_cpufreq("cpuinfo_max_freq"),
    ) {
        return (min, max);
    }

    let freqs = system.cpus().iter().map(|cpu| cpu.frequency());
    let min = freqs.clone().min().unwrap_or(0);
    let max = freqs.max().unwrap_or(0);
    (min, max)
}

fn memory_ratio(available: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(available as f64 / total as f64, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
