//! Console Report
//!
//! Builds a human-readable summary of the run as report lines, which the
//! embedding test harness prints at the end of the session.

use super::{Writer, WriterError};
use crate::keeper::{RunData, TimeKeeper};
use crate::monitoring::ResourceSummary;
use crate::timing::TimerRecord;

/// Width of the timeline bars in characters.
const CHART_WIDTH: f64 = 50.0;

/// Column width for timer names in the timeline.
const NAME_WIDTH: usize = 16;

/// Default primary writer: appends a timing and resource summary to the
/// collector's report.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReport {
    timeline: bool,
}

impl ConsoleReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also draws an ASCII timeline of all timers.
    pub fn with_timeline(mut self) -> Self {
        self.timeline = true;
        self
    }

    /// Report lines for `data`, without touching any collector.
    pub fn render(&self, data: &RunData) -> Vec<String> {
        let mut lines = vec![format!(
            "timekeeper: {} timer(s)",
            data.function_timers.len()
        )];

        for record in &data.function_timers {
            let runtime = match record.runtime_ns() {
                Some(ns) => format!("{} us", ns / 1_000),
                None => "not stopped".to_string(),
            };
            lines.push(format!("  {}: {}", label(record), runtime));
        }

        if !data.calibration.runs.is_empty() {
            lines.push(format!(
                "Timer overhead: {} ns mean over {} runs",
                data.calibration.mean,
                data.calibration.runs.len()
            ));
        }

        if let Some(info) = &data.system.info {
            lines.push(format!(
                "Host: {} ({} threads, {} cores, {})",
                info.hostname, info.threads, info.cores, info.os_name
            ));
        }

        if let Some(summary) = ResourceSummary::from_samples(&data.system.state_history) {
            lines.extend(summary.lines());
        }

        if self.timeline {
            lines.extend(timeline(&data.function_timers));
        }

        lines
    }
}

impl Writer for ConsoleReport {
    fn name(&self) -> &str {
        "report"
    }

    fn finalize(&self, keeper: &TimeKeeper) -> Result<(), WriterError> {
        for line in self.render(&keeper.data()) {
            keeper.report_line(line);
        }
        Ok(())
    }
}

/// `name[vN]`, or `<calibration>` for unnamed timers.
fn label(record: &TimerRecord) -> String {
    let name = record.test_name.as_deref().unwrap_or("<calibration>");
    format!("{}[v{}]", name, record.test_version)
}

/// ASCII timeline of completed timers, scaled to the span of the run.
///
/// Each timer is a bar showing when it ran relative to the earliest start.
fn timeline(records: &[TimerRecord]) -> Vec<String> {
    let mut lines = vec!["Timeline:".to_string()];

    let mut spans: Vec<(String, u64, u64)> = records
        .iter()
        .filter(|r| r.runtime_ns().is_some())
        .map(|r| (label(r), r.start_time_ns, r.end_time_ns))
        .collect();

    let Some(origin) = spans.iter().map(|(_, start, _)| *start).min() else {
        return lines;
    };
    let end = spans.iter().map(|(_, _, end)| *end).max().unwrap_or(origin);
    let total = end.saturating_sub(origin);
    if total == 0 {
        return lines;
    }

    let scale = CHART_WIDTH / total as f64;
    spans.sort_by_key(|(_, start, _)| *start);

    for (name, start, end) in spans {
        let offset = ((start - origin) as f64 * scale) as usize;
        let width = ((end - start) as f64 * scale).max(1.0) as usize;

        let mut bar = " ".repeat(offset);
        bar.push_str(&"#".repeat(width));

        lines.push(format!(
            "  {} |{:<chart$}| ({} us)",
            truncate(&name, NAME_WIDTH),
            bar,
            (end - start) / 1_000,
            chart = CHART_WIDTH as usize
        ));
    }

    lines.push(format!("  Total: {} us", total / 1_000));
    lines
}

/// Pads or truncates a string to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
