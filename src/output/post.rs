//! HTTP Output
//!
//! Posts the run data as JSON, either as one payload or as three payloads
//! (timer records, host info, sample history) to separate sub-paths.

use std::time::Duration;

use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{Writer, WriterError};
use crate::keeper::TimeKeeper;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sub-paths, relative to the base URL, for split payloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SplitPaths {
    /// Receives the list of timer records
    pub timers: String,
    /// Receives the host description
    pub info: String,
    /// Receives the sample history
    pub state: String,
}

impl Default for SplitPaths {
    fn default() -> Self {
        Self {
            timers: "timers".to_string(),
            info: "info".to_string(),
            state: "state".to_string(),
        }
    }
}

/// Posts run data to an HTTP endpoint.
///
/// Every response status is recorded as a report line. Non-success statuses
/// and transport errors are returned as [`WriterError`]s; nothing is retried.
#[derive(Debug, Clone)]
pub struct PostWriter {
    url: String,
    timeout: Duration,
    split: Option<SplitPaths>,
}

impl PostWriter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            split: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Posts three payloads to `paths` under the base URL instead of one.
    pub fn with_split(mut self, paths: SplitPaths) -> Self {
        self.split = Some(paths);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn post<T: Serialize + ?Sized>(
        &self,
        client: &Client,
        keeper: &TimeKeeper,
        url: &str,
        payload: &T,
    ) -> Result<(), WriterError> {
        let response = client
            .post(url)
            .json(payload)
            .send()
            .map_err(|source| WriterError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        keeper.report_line(format!("POST {} -> {}", url, status.as_u16()));

        if !status.is_success() {
            return Err(WriterError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        info!("Posted timing data to {} ({})", url, status);
        Ok(())
    }
}

impl Writer for PostWriter {
    fn name(&self) -> &str {
        "post"
    }

    fn finalize(&self, keeper: &TimeKeeper) -> Result<(), WriterError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| WriterError::Http {
                url: self.url.clone(),
                source,
            })?;

        let data = keeper.data();

        match &self.split {
            None => self.post(&client, keeper, &self.url, &data),
            Some(paths) => {
                self.post(
                    &client,
                    keeper,
                    &self.endpoint(&paths.timers),
                    &data.function_timers,
                )?;
                self.post(&client, keeper, &self.endpoint(&paths.info), &data.system.info)?;
                self.post(
                    &client,
                    keeper,
                    &self.endpoint(&paths.state),
                    &data.system.state_history,
                )
            }
        }
    }
}
