//! Run Data View
//!
//! The canonical payload handed to writers.

use serde::{Deserialize, Serialize};

use super::calibration::Calibration;
use crate::monitoring::{HostInfo, Sample};
use crate::timing::TimerRecord;

/// Host description and sampled utilization for the run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SystemData {
    /// `None` when monitoring was never set up or is unsupported
    pub info: Option<HostInfo>,
    pub state_history: Vec<Sample>,
}

/// Everything a run produced.
///
/// Serialized shape:
///
/// ```json
/// {
///   "system": { "info": { ... }, "state_history": [ ... ] },
///   "function_timers": [ { "test_name": "...", ... } ],
///   "calibration": { "runs": [ ... ], "mean": 0 },
///   "report": [ "..." ]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunData {
    pub system: SystemData,
    /// Timer records in creation order
    pub function_timers: Vec<TimerRecord>,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub report: Vec<String>,
}
