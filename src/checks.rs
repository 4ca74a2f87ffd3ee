// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Named response checks.
//!
//! Every response is run through the full check set. A check that returns
//! an error or panics is counted as failed; it never stops the run.

use crate::config::CheckConfig;
use crate::driver::Response;
use crate::error::CheckError;
use crate::metrics::HarnessMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// A named predicate over a response.
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, response: &Response) -> Result<bool, CheckError>;
}

/// Status code equals an expected value.
#[derive(Debug, Clone)]
pub struct StatusCheck {
    name: String,
    expected: u16,
}

impl StatusCheck {
    pub fn new(name: impl Into<String>, expected: u16) -> Self {
        Self {
            name: name.into(),
            expected,
        }
    }
}

impl Check for StatusCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, response: &Response) -> Result<bool, CheckError> {
        Ok(response.status == self.expected)
    }
}

/// JSON body contains a field.
#[derive(Debug, Clone)]
pub struct JsonFieldCheck {
    name: String,
    field: String,
}

impl JsonFieldCheck {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }
}

impl Check for JsonFieldCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, response: &Response) -> Result<bool, CheckError> {
        let body = response.body.as_ref().ok_or(CheckError::NotJson)?;
        Ok(body.get(&self.field).is_some())
    }
}

/// Response arrived within a bound.
#[derive(Debug, Clone)]
pub struct LatencyCheck {
    name: String,
    max: Duration,
}

impl LatencyCheck {
    pub fn new(name: impl Into<String>, max: Duration) -> Self {
        Self {
            name: name.into(),
            max,
        }
    }
}

impl Check for LatencyCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, response: &Response) -> Result<bool, CheckError> {
        Ok(response.latency <= self.max)
    }
}

/// Closure-backed check.
pub struct PredicateCheck<F> {
    name: String,
    predicate: F,
}

/// Build a check from a name and a closure.
pub fn predicate<F>(name: impl Into<String>, predicate: F) -> PredicateCheck<F>
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    PredicateCheck {
        name: name.into(),
        predicate,
    }
}

impl<F> Check for PredicateCheck<F>
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, response: &Response) -> Result<bool, CheckError> {
        Ok((self.predicate)(response))
    }
}

/// Pass/fail counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
    /// Fails caused by an error or panic inside the check
    pub errors: u64,
}

impl CheckCounts {
    fn add(&mut self, verdict: &Result<bool, CheckError>) {
        match verdict {
            Ok(true) => self.passes += 1,
            Ok(false) => self.fails += 1,
            Err(_) => {
                self.fails += 1;
                self.errors += 1;
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Default)]
struct CheckTally {
    by_check: BTreeMap<String, CheckCounts>,
    by_tag: BTreeMap<(String, String), CheckCounts>,
}

/// Result of running the check set on one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckRun {
    pub passed: usize,
    pub failed: usize,
}

/// Evaluates the check set and accumulates counts.
pub struct CheckEngine {
    checks: Vec<Box<dyn Check>>,
    tally: Mutex<CheckTally>,
    metrics: Option<Arc<HarnessMetrics>>,
}

impl CheckEngine {
    pub fn new(checks: Vec<Box<dyn Check>>) -> Self {
        let by_check = checks
            .iter()
            .map(|c| (c.name().to_string(), CheckCounts::default()))
            .collect();
        Self {
            checks,
            tally: Mutex::new(CheckTally {
                by_check,
                by_tag: BTreeMap::new(),
            }),
            metrics: None,
        }
    }

    /// Build the engine from check definitions.
    pub fn from_config(configs: &[CheckConfig]) -> Self {
        let checks = configs
            .iter()
            .map(|config| -> Box<dyn Check> {
                match config {
                    CheckConfig::Status { name, expected } => {
                        Box::new(StatusCheck::new(name.clone(), *expected))
                    }
                    CheckConfig::JsonField { name, field } => {
                        Box::new(JsonFieldCheck::new(name.clone(), field.clone()))
                    }
                    CheckConfig::MaxLatency { name, max_ms } => Box::new(LatencyCheck::new(
                        name.clone(),
                        Duration::from_millis(*max_ms),
                    )),
                }
            })
            .collect();
        Self::new(checks)
    }

    pub fn with_metrics(mut self, metrics: Arc<HarnessMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check against a response.
    pub fn evaluate(&self, tag: &str, response: &Response) -> CheckRun {
        let verdicts: Vec<Result<bool, CheckError>> = self
            .checks
            .iter()
            .map(|check| run_guarded(check.as_ref(), response))
            .collect();

        self.record(tag, &verdicts)
    }

    /// Record every check as failed for a request that produced no response.
    pub fn fail_all(&self, tag: &str) -> CheckRun {
        let verdicts: Vec<Result<bool, CheckError>> = vec![Ok(false); self.checks.len()];
        self.record(tag, &verdicts)
    }

    fn record(&self, tag: &str, verdicts: &[Result<bool, CheckError>]) -> CheckRun {
        let mut run = CheckRun::default();
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);

        for (check, verdict) in self.checks.iter().zip(verdicts) {
            let name = check.name();
            let counts = tally.by_check.entry(name.to_string()).or_default();
            counts.add(verdict);
            if let Err(e) = verdict {
                // Warn once per check
                if counts.errors == 1 {
                    warn!(check = name, error = %e, "Check errored, further errors logged at debug");
                } else {
                    debug!(check = name, error = %e, "Check errored");
                }
            }
            tally
                .by_tag
                .entry((name.to_string(), tag.to_string()))
                .or_default()
                .add(verdict);

            let passed = matches!(verdict, Ok(true));
            if let Some(metrics) = &self.metrics {
                metrics.record_check(name, passed);
            }

            if passed {
                run.passed += 1;
            } else {
                run.failed += 1;
            }
        }

        run
    }

    /// Snapshot of the accumulated counts.
    pub fn summary(&self) -> CheckSummary {
        let tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);

        let checks = tally
            .by_check
            .iter()
            .map(|(name, counts)| CheckRow {
                name: name.clone(),
                tag: None,
                passes: counts.passes,
                fails: counts.fails,
                errors: counts.errors,
            })
            .collect();
        let by_tag = tally
            .by_tag
            .iter()
            .map(|((name, tag), counts)| CheckRow {
                name: name.clone(),
                tag: Some(tag.clone()),
                passes: counts.passes,
                fails: counts.fails,
                errors: counts.errors,
            })
            .collect();

        CheckSummary { checks, by_tag }
    }
}

/// Evaluate a check, turning panics into errors.
fn run_guarded(check: &dyn Check, response: &Response) -> Result<bool, CheckError> {
    panic::catch_unwind(AssertUnwindSafe(|| check.evaluate(response))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(CheckError::Panicked(message))
    })
}

/// One row of check counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub passes: u64,
    pub fails: u64,
    pub errors: u64,
}

/// Check counts at the end of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckSummary {
    pub checks: Vec<CheckRow>,
    pub by_tag: Vec<CheckRow>,
}

impl CheckSummary {
    pub fn get(&self, name: &str) -> Option<&CheckRow> {
        self.checks.iter().find(|row| row.name == name)
    }

    pub fn total_passes(&self) -> u64 {
        self.checks.iter().map(|row| row.passes).sum()
    }

    pub fn total_fails(&self) -> u64 {
        self.checks.iter().map(|row| row.fails).sum()
    }

    /// Ratio of passed evaluations (0.0 when nothing was evaluated).
    pub fn pass_rate(&self) -> f64 {
        let total = self.total_passes() + self.total_fails();
        if total == 0 {
            0.0
        } else {
            self.total_passes() as f64 / total as f64
        }
    }
}
