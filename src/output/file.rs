//! File Output
//!
//! Serializes the run data to a file, JSON by default.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};

use super::{Writer, WriterError};
use crate::keeper::TimeKeeper;

/// Encoding for serialized run data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Encodes any serializable value in this format.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WriterError> {
        match self {
            Self::Json => {
                serde_json::to_vec_pretty(value).map_err(|e| WriterError::Encode(e.to_string()))
            }
            Self::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| WriterError::Encode(e.to_string())),
        }
    }
}

/// `execution_times_<unix-timestamp>.<ext>`
pub fn default_file_name(format: Format) -> String {
    format!(
        "execution_times_{}.{}",
        Utc::now().timestamp(),
        format.extension()
    )
}

/// Writes the collector's data view to a file.
///
/// Parent directories are created as needed.
#[derive(Debug, Clone)]
pub struct FileWriter {
    path: PathBuf,
    format: Format,
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// JSON writer for an explicit path.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Format::Json)
    }

    /// Writer for a timestamped file inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, format: Format) -> Self {
        Self::new(dir.as_ref().join(default_file_name(format)), format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }
}

impl Default for FileWriter {
    /// Timestamped JSON file in the current directory.
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(cwd, Format::Json)
    }
}

impl Writer for FileWriter {
    fn name(&self) -> &str {
        "file"
    }

    fn finalize(&self, keeper: &TimeKeeper) -> Result<(), WriterError> {
        let bytes = self.format.encode(&keeper.data())?;

        let io_error = |source: std::io::Error| WriterError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, bytes).map_err(io_error)?;

        info!("Wrote timing data to {}", self.path.display());
        keeper.report_line(format!("Timing data written to {}", self.path.display()));
        Ok(())
    }
}
