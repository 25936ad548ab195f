//! Clock Calibration
//!
//! Measures the cost of an empty start/stop cycle so consumers can judge
//! how much of a short timing is overhead.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::config::CalibrationConfig;
use crate::timing::{Clock, Timer};

/// Runtimes of empty timer cycles, in nanoseconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Calibration {
    pub runs: Vec<u64>,
    /// Rounded mean of `runs` (0 when there are none)
    pub mean: u64,
}

impl Calibration {
    pub fn from_runs(runs: Vec<u64>) -> Self {
        let mean = if runs.is_empty() {
            0
        } else {
            let total: u128 = runs.iter().map(|&r| u128::from(r)).sum();
            (total as f64 / runs.len() as f64).round() as u64
        };
        Self { runs, mean }
    }
}

/// Runs the warmup cycles, then records the calibration cycles.
pub fn calibrate(clock: &Arc<dyn Clock>, config: &CalibrationConfig) -> Calibration {
    for _ in 0..config.warmup_loops {
        empty_cycle(clock);
    }

    let runs: Vec<u64> = (0..config.calibration_loops)
        .filter_map(|_| empty_cycle(clock))
        .collect();

    let calibration = Calibration::from_runs(runs);
    debug!(
        "Calibrated timer overhead: {} ns mean over {} runs",
        calibration.mean,
        calibration.runs.len()
    );
    calibration
}

fn empty_cycle(clock: &Arc<dyn Clock>) -> Option<u64> {
    let timer = Timer::with_clock(None, 0, Arc::clone(clock));
    timer.start().ok()?;
    timer.stop();
    timer.runtime_ns()
}
