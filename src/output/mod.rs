//! Output Module
//!
//! Writers receive the collector once, when the run is finalized, and export
//! its data somewhere.
//!
//! # Writers
//!
//! - [`ConsoleReport`]: appends a human-readable summary to the report
//! - [`FileWriter`]: serializes the run data to a file
//! - [`PostWriter`]: posts the run data over HTTP
//! - [`Discard`]: does nothing

pub mod console;
pub mod file;
pub mod post;

use std::path::PathBuf;

use thiserror::Error;

use crate::keeper::TimeKeeper;

pub use console::ConsoleReport;
pub use file::{default_file_name, FileWriter, Format};
pub use post::{PostWriter, SplitPaths};

/// Errors a writer may return from `finalize`.
///
/// The collector turns these into report lines; they never abort the run.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("could not write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode run data: {0}")]
    Encode(String),

    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{url}' responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

/// An output sink for a finished run.
///
/// Writers must treat the collector as read-only apart from
/// [`TimeKeeper::report_line`].
pub trait Writer: Send + Sync {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Exports the run.
    fn finalize(&self, keeper: &TimeKeeper) -> Result<(), WriterError>;
}

/// Writer that exports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl Writer for Discard {
    fn name(&self) -> &str {
        "discard"
    }

    fn finalize(&self, _keeper: &TimeKeeper) -> Result<(), WriterError> {
        Ok(())
    }
}
