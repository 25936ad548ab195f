//! Keeper Module
//!
//! The run-scoped collector and everything it is built from.
//!
//! # Components
//!
//! - [`TimeKeeper`]: owns timers, the monitor, and the report
//! - [`KeeperConfig`]: YAML-backed run settings
//! - [`Extensions`]: code-level hooks (clock, writers, monitor)
//! - [`RunData`]: the snapshot handed to writers

pub mod calibration;
pub mod collector;
pub mod config;
pub mod data;
pub mod extensions;

pub use calibration::{calibrate, Calibration};
pub use collector::{KeeperError, Phase, TimeKeeper};
pub use config::{
    load_config, parse_config, CalibrationConfig, ConfigError, KeeperConfig, MonitorConfig,
    OutputConfig, PostConfig,
};
pub use data::{RunData, SystemData};
pub use extensions::{Extensions, MonitorFactory};
