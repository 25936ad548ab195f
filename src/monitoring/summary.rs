//! Resource Usage Summary
//!
//! Reduces a sample history to the handful of figures shown in reports.

use super::probe::Sample;

/// Aggregate figures over a sample history.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    pub samples: usize,
    pub average_cpu: f32,
    pub peak_cpu: f32,
    /// Lowest fraction of memory left available during the run
    pub min_mem_available: f64,
    /// Mean CPU frequency in MHz
    pub average_freq: u64,
}

impl ResourceSummary {
    /// Summarizes `samples`, or returns `None` if there are none.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let average_cpu = samples.iter().map(|s| s.cpu_percent).sum::<f32>() / count as f32;
        let peak_cpu = samples.iter().map(|s| s.cpu_percent).fold(0.0, f32::max);
        let min_mem_available = samples
            .iter()
            .map(|s| s.mem_available_ratio)
            .fold(1.0, f64::min);
        let average_freq = samples.iter().map(|s| s.freq_current).sum::<u64>() / count as u64;

        Some(Self {
            samples: count,
            average_cpu,
            peak_cpu,
            min_mem_available,
            average_freq,
        })
    }

    /// Human-readable lines, one figure per line.
    pub fn lines(&self) -> Vec<String> {
        vec![
            "Resource Usage:".to_string(),
            format!("  Average CPU: {:.1}%", self.average_cpu),
            format!("  Peak CPU: {:.1}%", self.peak_cpu),
            format!("  Min Available Memory: {:.0}%", self.min_mem_available * 100.0),
            format!("  Average Frequency: {} MHz", self.average_freq),
            format!("  Samples: {}", self.samples),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f32, freq: u64, mem: f64, ts: u64) -> Sample {
        Sample {
            cpu_percent: cpu,
            freq_current: freq,
            mem_available_ratio: mem,
            timestamp_ns: ts,
        }
    }

    #[test]
    fn test_summary_empty() {
        assert!(ResourceSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_summary_figures() {
        let samples = vec![
            sample(10.0, 2_000, 0.80, 1),
            sample(30.0, 3_000, 0.60, 2),
            sample(20.0, 1_000, 0.70, 3),
        ];

        let summary = ResourceSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.samples, 3);
        assert!((summary.average_cpu - 20.0).abs() < f32::EPSILON);
        assert_eq!(summary.peak_cpu, 30.0);
        assert_eq!(summary.min_mem_available, 0.60);
        assert_eq!(summary.average_freq, 2_000);
    }

    #[test]
    fn test_summary_lines_format() {
        let summary = ResourceSummary::from_samples(&[sample(50.0, 2_400, 0.5, 1)]).unwrap();
        let lines = summary.lines();

        assert_eq!(lines[0], "Resource Usage:");
        assert!(lines.iter().any(|l| l.contains("Average CPU: 50.0%")));
        assert!(lines.iter().any(|l| l.contains("Peak CPU")));
        assert!(lines.iter().any(|l| l.contains("Min Available Memory: 50%")));
        assert!(lines.iter().any(|l| l.contains("Samples: 1")));
    }
}
