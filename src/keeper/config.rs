//! Run Configuration
//!
//! Declarative settings for a run, loadable from YAML.
//!
//! # Example YAML Format
//!
//! ```yaml
//! monitor:
//!   enabled: true
//!   interval_secs: 1.0
//!
//! calibration:
//!   warmup_loops: 5
//!   calibration_loops: 15
//!
//! output:
//!   report: true
//!   file: results/
//!   format: json
//!   post:
//!     url: http://perf.example.com/api
//!     split:
//!       timers: timers
//!       info: machines
//!       state: states
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::{
    Monitor, NullMonitor, SamplingMonitor, DEFAULT_INTERVAL, DEFAULT_SHUTDOWN_GRACE,
};
use crate::output::{ConsoleReport, Discard, FileWriter, Format, PostWriter, SplitPaths, Writer};

/// Default HTTP timeout for posted results.
const DEFAULT_POST_TIMEOUT_SECS: u64 = 30;

/// Upper bound for the sample interval and the shutdown grace (one day).
const MAX_MONITOR_SECS: f64 = 86_400.0;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Complete settings for one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KeeperConfig {
    pub monitor: MonitorConfig,
    pub calibration: CalibrationConfig,
    pub output: OutputConfig,
}

/// Background sampling settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sample the host while the run executes
    pub enabled: bool,
    /// Seconds between samples
    pub interval_secs: f64,
    /// Seconds `stop` waits beyond one interval before giving up
    pub shutdown_grace_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_INTERVAL.as_secs_f64(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs_f64(),
        }
    }
}

impl MonitorConfig {
    /// Sample interval, falling back to the default for unusable values.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.shutdown_grace_secs).unwrap_or(DEFAULT_SHUTDOWN_GRACE)
    }

    /// Builds the monitor these settings describe.
    pub fn build(&self) -> Box<dyn Monitor> {
        if !self.enabled {
            debug!("Monitoring disabled by configuration");
            return Box::new(NullMonitor);
        }
        Box::new(SamplingMonitor::new(self.interval()).with_shutdown_grace(self.shutdown_grace()))
    }
}

/// Clock calibration settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Start/stop cycles run and discarded before measuring
    pub warmup_loops: usize,
    /// Start/stop cycles recorded as calibration runs
    pub calibration_loops: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warmup_loops: 5,
            calibration_loops: 15,
        }
    }
}

/// Which writers receive the run's data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Append a human-readable summary to the report
    pub report: bool,
    /// Serialize results to this file, or into this directory
    pub file: Option<PathBuf>,
    /// Encoding used for `file`
    pub format: Format,
    /// Post results over HTTP
    pub post: Option<PostConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report: true,
            file: None,
            format: Format::Json,
            post: None,
        }
    }
}

impl OutputConfig {
    /// The primary writer: the console report, or nothing when disabled.
    pub fn primary_writer(&self) -> Box<dyn Writer> {
        if self.report {
            Box::new(ConsoleReport::new())
        } else {
            Box::new(Discard)
        }
    }

    /// Writers added alongside the primary one, in file-then-post order.
    pub fn additional_writers(&self) -> Vec<Box<dyn Writer>> {
        let mut writers: Vec<Box<dyn Writer>> = Vec::new();

        if let Some(path) = &self.file {
            let writer = if path.is_dir() {
                FileWriter::in_dir(path, self.format)
            } else {
                FileWriter::new(path, self.format)
            };
            writers.push(Box::new(writer));
        }

        if let Some(post) = &self.post {
            writers.push(Box::new(post.build()));
        }

        writers
    }
}

/// HTTP destination for results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PostConfig {
    /// Full URI results are posted to (or the base for `split` paths)
    pub url: String,
    #[serde(default = "default_post_timeout")]
    pub timeout_secs: u64,
    /// Post timers, host info, and samples separately
    #[serde(default)]
    pub split: Option<SplitPaths>,
}

fn default_post_timeout() -> u64 {
    DEFAULT_POST_TIMEOUT_SECS
}

impl PostConfig {
    /// Single-payload destination with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: DEFAULT_POST_TIMEOUT_SECS,
            split: None,
        }
    }

    pub fn build(&self) -> PostWriter {
        let writer =
            PostWriter::new(&self.url).with_timeout(Duration::from_secs(self.timeout_secs));
        match &self.split {
            Some(paths) => writer.with_split(paths.clone()),
            None => writer,
        }
    }
}

impl KeeperConfig {
    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.monitor.interval_secs;
        if !interval.is_finite() || interval <= 0.0 || interval > MAX_MONITOR_SECS {
            return Err(ConfigError::Invalid {
                field: "monitor.interval_secs",
                message: format!(
                    "must be between 0 and {} seconds, got {}",
                    MAX_MONITOR_SECS, interval
                ),
            });
        }

        let grace = self.monitor.shutdown_grace_secs;
        if !grace.is_finite() || grace < 0.0 || grace > MAX_MONITOR_SECS {
            return Err(ConfigError::Invalid {
                field: "monitor.shutdown_grace_secs",
                message: format!(
                    "must be between 0 and {} seconds, got {}",
                    MAX_MONITOR_SECS, grace
                ),
            });
        }

        if let Some(post) = &self.output.post {
            if !post.url.starts_with("http://") && !post.url.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    field: "output.post.url",
                    message: format!("'{}' is not an http(s) URL", post.url),
                });
            }
        }

        Ok(())
    }
}

/// Loads and validates configuration from a YAML file.
///
/// Every field is optional; missing ones take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<KeeperConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config(&content)
}

/// Parses and validates configuration from YAML text.
pub fn parse_config(yaml: &str) -> Result<KeeperConfig, ConfigError> {
    // An empty document deserializes as unit, not as an empty mapping.
    if yaml.trim().is_empty() {
        return Ok(KeeperConfig::default());
    }

    let config: KeeperConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
