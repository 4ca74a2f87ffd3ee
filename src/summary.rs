// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-of-run summary in text or JSON.

use crate::aggregate::LatencyStats;
use crate::checks::CheckRow;
use crate::config::{SummaryConfig, SummaryFormat};
use crate::error::HarnessError;
use crate::runner::RunReport;
use crate::thresholds::ThresholdResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::info;

/// Flattened, serialisable view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub passed: bool,
    pub target_rate: f64,
    pub duration_ms: u64,
    pub issuing_ms: u64,
    pub ticks: u64,
    pub dropped: u64,
    pub cancelled: u64,
    pub peak_workers: usize,
    pub stopped_early: bool,
    pub requests: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub requests_per_second: f64,
    pub latency_ms: LatencyStats,
    pub by_tag: BTreeMap<String, TagSummary>,
    pub outcomes: BTreeMap<String, u64>,
    pub checks: Vec<CheckRow>,
    pub checks_by_tag: Vec<CheckRow>,
    pub thresholds: Vec<ThresholdResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagSummary {
    pub requests: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub latency_ms: LatencyStats,
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        let aggregate = &report.aggregate;
        let by_tag = aggregate
            .by_tag
            .iter()
            .map(|(tag, set)| {
                (
                    tag.clone(),
                    TagSummary {
                        requests: set.count,
                        failed: set.failed,
                        failure_rate: set.failure_rate(),
                        latency_ms: set.latency_stats(),
                    },
                )
            })
            .collect();

        Self {
            target: report.target.clone(),
            passed: report.passed(),
            target_rate: report.rate,
            duration_ms: report.scheduler.elapsed.as_millis() as u64,
            issuing_ms: report.scheduler.issuing.as_millis() as u64,
            ticks: report.scheduler.ticks,
            dropped: report.scheduler.dropped,
            cancelled: report.scheduler.cancelled,
            peak_workers: report.scheduler.peak_workers,
            stopped_early: report.scheduler.stopped_early,
            requests: aggregate.all.count,
            failed: aggregate.all.failed,
            failure_rate: aggregate.all.failure_rate(),
            requests_per_second: aggregate.request_rate(&aggregate.all),
            latency_ms: aggregate.all.latency_stats(),
            by_tag,
            outcomes: aggregate.outcomes.clone(),
            checks: report.checks.checks.clone(),
            checks_by_tag: report.checks.by_tag.clone(),
            thresholds: report.thresholds.results.clone(),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Load Run Summary ===")?;
        writeln!(f, "Target:            {}", self.target)?;
        writeln!(f, "Duration:          {} ms ({} ms issuing)", self.duration_ms, self.issuing_ms)?;
        writeln!(f, "Target Rate:       {:.2}/s", self.target_rate)?;
        writeln!(f, "Ticks:             {}", self.ticks)?;
        writeln!(f, "Requests/sec:      {:.2}", self.requests_per_second)?;
        writeln!(f, "Peak Workers:      {}", self.peak_workers)?;
        if self.stopped_early {
            writeln!(f, "Stopped early:     yes")?;
        }
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Failed:            {} ({:.2}%)", self.failed, self.failure_rate * 100.0)?;
        writeln!(f, "Dropped:           {}", self.dropped)?;
        writeln!(f, "Cancelled:         {}", self.cancelled)?;
        for (outcome, count) in &self.outcomes {
            writeln!(f, "  {:<16} {}", outcome, count)?;
        }
        writeln!(f)?;
        writeln!(f, "--- Latency (ms) ---")?;
        write_latency(f, "all", &self.latency_ms)?;
        for (tag, summary) in &self.by_tag {
            write_latency(f, tag, &summary.latency_ms)?;
        }
        writeln!(f)?;
        writeln!(f, "--- Checks ---")?;
        for row in &self.checks {
            let total = row.passes + row.fails;
            let pct = if total == 0 {
                0.0
            } else {
                row.passes as f64 / total as f64 * 100.0
            };
            writeln!(
                f,
                "{} {:<24} {:.2}% ({} passed, {} failed)",
                if row.fails == 0 { "✓" } else { "✗" },
                row.name,
                pct,
                row.passes,
                row.fails
            )?;
        }
        writeln!(f)?;
        writeln!(f, "--- Thresholds ---")?;
        for result in &self.thresholds {
            writeln!(
                f,
                "{} {} {} (observed {:.4})",
                if result.passed { "✓" } else { "✗" },
                result.metric,
                result.rule,
                result.observed
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Result:            {}", if self.passed { "PASS" } else { "FAIL" })?;
        Ok(())
    }
}

fn write_latency(
    f: &mut std::fmt::Formatter<'_>,
    label: &str,
    stats: &LatencyStats,
) -> std::fmt::Result {
    writeln!(
        f,
        "{:<18} min={:.2} avg={:.2} med={:.2} p90={:.2} p95={:.2} p99={:.2} max={:.2}",
        label, stats.min, stats.avg, stats.med, stats.p90, stats.p95, stats.p99, stats.max
    )
}

/// Render the summary in the configured format.
pub fn render(report: &RunReport, format: SummaryFormat) -> Result<String, HarnessError> {
    let summary = RunSummary::from(report);
    Ok(match format {
        SummaryFormat::Text => summary.to_string(),
        SummaryFormat::Json => serde_json::to_string_pretty(&summary)? + "\n",
    })
}

/// Write the summary to the configured file, or stdout.
pub fn emit(report: &RunReport, config: &SummaryConfig) -> Result<(), HarnessError> {
    let rendered = render(report, config.format)?;
    match &config.path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), "Summary written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
