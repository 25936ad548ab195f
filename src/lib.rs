//! timekeeper - Wall-Clock Timing for Test Runs
//!
//! Records named, versioned timings of code regions during a test session,
//! samples host utilization in the background, and exports everything once
//! at the end of the run through a chain of writers.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`timing`]: Timers and the clocks they read
//! - [`monitoring`]: Background sampling of CPU, frequency, and memory
//! - [`keeper`]: The run-scoped collector, its configuration and data view
//! - [`output`]: Writers that export a finished run
//!
//! # Example
//!
//! ```rust,no_run
//! use timekeeper::keeper::{load_config, TimeKeeper};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keeper = TimeKeeper::new(load_config("timekeeper.yaml")?);
//!     keeper.start_monitor()?;
//!
//!     let timer = keeper.get_timer("test_parse", 1);
//!     timer.start()?;
//!     // ... code under test ...
//!     timer.stop();
//!     timer.note("rows", 1_000);
//!
//!     keeper.finalize()?;
//!     keeper.write_report(&mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```

pub mod keeper;
pub mod monitoring;
pub mod output;
pub mod timing;

// Re-export commonly used types
pub use keeper::{load_config, Extensions, KeeperConfig, RunData, TimeKeeper};
pub use output::Writer;
pub use timing::Timer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "timekeeper";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timekeeper.yaml");
        std::fs::write(&path, "monitor:\n  enabled: false\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(!config.monitor.enabled);
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "timekeeper");
    }

    #[test]
    fn test_module_exports_timer() {
        let timer = Timer::new("test", 2);
        assert_eq!(timer.test_name(), Some("test"));
        assert_eq!(timer.test_version(), 2);
    }

    #[test]
    fn test_module_exports_config() {
        let config = KeeperConfig::default();
        assert!(config.monitor.enabled);
        assert!(config.output.report);
    }

    #[test]
    fn test_module_exports_writer() {
        let writers: Vec<Box<dyn Writer>> = KeeperConfig::default()
            .output
            .additional_writers();
        assert!(writers.is_empty());

        let primary: Box<dyn Writer> = KeeperConfig::default().output.primary_writer();
        assert_eq!(primary.name(), "report");
    }

    #[test]
    fn test_version_stamped_on_host_info() {
        let info = monitoring::HostInfo::new(1, 1, 0, 0, "h", 1, "os", "1");
        assert_eq!(info.keeper_version, VERSION);
    }
}
