// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Pass/fail thresholds over the aggregated run.
//!
//! Rules use the k6 grammar: a metric key, optionally narrowed to one tag
//! (`http_req_duration{name:AcceptOrder}`), mapped to expressions of the
//! form `<aggregate> <comparator> <bound>`, e.g. `p(95)<400`.

use crate::aggregate::Aggregate;
use crate::checks::CheckSummary;
use crate::error::ConfigError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    HttpReqFailed,
    HttpReqDuration,
    HttpReqs,
    Checks,
    DroppedIterations,
    Iterations,
}

impl ThresholdMetric {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "http_req_failed" => Self::HttpReqFailed,
            "http_req_duration" => Self::HttpReqDuration,
            "http_reqs" => Self::HttpReqs,
            "checks" => Self::Checks,
            "dropped_iterations" => Self::DroppedIterations,
            "iterations" => Self::Iterations,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::HttpReqFailed => "http_req_failed",
            Self::HttpReqDuration => "http_req_duration",
            Self::HttpReqs => "http_reqs",
            Self::Checks => "checks",
            Self::DroppedIterations => "dropped_iterations",
            Self::Iterations => "iterations",
        }
    }

    fn supports(self, aggregation: Aggregation) -> bool {
        use Aggregation::*;
        match self {
            Self::HttpReqDuration => matches!(
                aggregation,
                Avg | Min | Max | Med | Percentile(_)
            ),
            Self::HttpReqFailed | Self::HttpReqs | Self::DroppedIterations | Self::Iterations => {
                matches!(aggregation, Rate | Count)
            }
            Self::Checks => matches!(aggregation, Rate),
        }
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in [0, 100]
    Percentile(f64),
}

impl Aggregation {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let aggregation = match text {
            "rate" => Self::Rate,
            "count" => Self::Count,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "med" => Self::Med,
            _ => {
                let inner = text.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                if !(0.0..=100.0).contains(&p) {
                    return None;
                }
                Self::Percentile(p)
            }
        };
        Some(aggregation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    /// Split `expression` at its comparator. Two-character operators win.
    fn split(expression: &str) -> Option<(&str, Self, &str)> {
        let start = expression.find(['<', '>', '=', '!'])?;
        let rest = &expression[start..];
        let (comparator, width) = if rest.starts_with("<=") {
            (Self::Le, 2)
        } else if rest.starts_with(">=") {
            (Self::Ge, 2)
        } else if rest.starts_with("==") {
            (Self::Eq, 2)
        } else if rest.starts_with("!=") {
            (Self::Ne, 2)
        } else if rest.starts_with('<') {
            (Self::Lt, 1)
        } else if rest.starts_with('>') {
            (Self::Gt, 1)
        } else {
            return None;
        };
        Some((
            &expression[..start],
            comparator,
            &expression[start + width..],
        ))
    }

    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
            Self::Ne => observed != bound,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        })
    }
}

/// One parsed threshold expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    /// Config key as written, e.g. `http_req_duration{name:AcceptOrder}`
    pub key: String,
    pub metric: ThresholdMetric,
    pub tag: Option<String>,
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub bound: f64,
    pub expression: String,
}

impl ThresholdRule {
    pub fn parse(key: &str, expression: &str) -> Result<Self, ConfigError> {
        let (metric, tag) = parse_key(key)?;
        let invalid = |reason: &str| ConfigError::InvalidThreshold {
            metric: key.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let (aggregation, comparator, bound) =
            Comparator::split(expression).ok_or_else(|| invalid("missing comparator"))?;
        let aggregation = Aggregation::parse(aggregation)
            .ok_or_else(|| invalid("unknown aggregation"))?;
        let bound: f64 = bound
            .trim()
            .parse()
            .map_err(|_| invalid("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(invalid("bound is not a number"));
        }
        if !metric.supports(aggregation) {
            return Err(invalid(&format!("aggregation not supported by {}", metric)));
        }

        Ok(Self {
            key: key.to_string(),
            metric,
            tag,
            aggregation,
            comparator,
            bound,
            expression: expression.trim().to_string(),
        })
    }

    /// Parse every configured rule, failing on the first invalid one.
    pub fn parse_all(
        thresholds: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Self>, ConfigError> {
        thresholds
            .iter()
            .flat_map(|(key, expressions)| {
                expressions
                    .iter()
                    .map(move |expression| Self::parse(key, expression))
            })
            .collect()
    }

    /// Observed value of this rule's aggregate.
    pub fn observe(&self, aggregate: &Aggregate, checks: &CheckSummary) -> f64 {
        let set = aggregate.select(self.tag.as_deref());
        match (self.metric, self.aggregation) {
            (ThresholdMetric::HttpReqFailed, Aggregation::Rate) => set.failure_rate(),
            (ThresholdMetric::HttpReqFailed, _) => set.failed as f64,
            (ThresholdMetric::HttpReqs, Aggregation::Rate) => aggregate.request_rate(&set),
            (ThresholdMetric::HttpReqs, _) => set.count as f64,
            (ThresholdMetric::Iterations, Aggregation::Rate) => {
                per_second(set.iterations(), aggregate)
            }
            (ThresholdMetric::Iterations, _) => set.iterations() as f64,
            (ThresholdMetric::DroppedIterations, Aggregation::Rate) => {
                per_second(set.dropped, aggregate)
            }
            (ThresholdMetric::DroppedIterations, _) => set.dropped as f64,
            (ThresholdMetric::Checks, _) => check_rate(checks, self.tag.as_deref()),
            (ThresholdMetric::HttpReqDuration, aggregation) => match aggregation {
                Aggregation::Avg => set.avg_ms(),
                Aggregation::Min => set.min_ms(),
                Aggregation::Max => set.max_ms(),
                Aggregation::Med => set.percentile_ms(50.0),
                Aggregation::Percentile(p) => set.percentile_ms(p),
                Aggregation::Rate | Aggregation::Count => 0.0,
            },
        }
    }
}

fn parse_key(key: &str) -> Result<(ThresholdMetric, Option<String>), ConfigError> {
    let key = key.trim();
    let (name, tag) = match key.split_once('{') {
        None => (key, None),
        Some((name, selector)) => {
            let tag = selector
                .strip_suffix('}')
                .and_then(|s| s.trim().strip_prefix("name:"))
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .ok_or_else(|| ConfigError::InvalidThreshold {
                    metric: key.to_string(),
                    expression: String::new(),
                    reason: "selector must be {name:<tag>}".to_string(),
                })?;
            (name.trim(), Some(tag.to_string()))
        }
    };
    let metric =
        ThresholdMetric::parse(name).ok_or_else(|| ConfigError::UnknownMetric(name.to_string()))?;
    Ok((metric, tag))
}

fn per_second(count: u64, aggregate: &Aggregate) -> f64 {
    let secs = aggregate.elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

fn check_rate(checks: &CheckSummary, tag: Option<&str>) -> f64 {
    let Some(tag) = tag else {
        return checks.pass_rate();
    };
    let (passes, total) = checks
        .by_tag
        .iter()
        .filter(|row| row.tag.as_deref() == Some(tag))
        .fold((0u64, 0u64), |(p, t), row| (p + row.passes, t + row.passes + row.fails));
    if total == 0 {
        0.0
    } else {
        passes as f64 / total as f64
    }
}

/// Outcome of one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    /// Expression text, e.g. `p(95)<400`
    pub rule: String,
    /// Metric key as configured
    pub metric: String,
    pub comparator: Comparator,
    pub bound: f64,
    pub observed: f64,
    pub passed: bool,
}

/// Outcome of every rule.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn violations(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Evaluate rules against the aggregated run.
pub fn evaluate(
    rules: &[ThresholdRule],
    aggregate: &Aggregate,
    checks: &CheckSummary,
) -> ThresholdReport {
    let results: Vec<ThresholdResult> = rules
        .iter()
        .map(|rule| {
            let observed = rule.observe(aggregate, checks);
            let passed = rule.comparator.holds(observed, rule.bound);
            if !passed {
                warn!(
                    metric = %rule.key,
                    rule = %rule.expression,
                    observed,
                    "Threshold crossed"
                );
            }
            ThresholdResult {
                rule: rule.expression.clone(),
                metric: rule.key.clone(),
                comparator: rule.comparator,
                bound: rule.bound,
                observed,
                passed,
            }
        })
        .collect();

    let report = ThresholdReport { results };
    info!(
        rules = report.results.len(),
        violated = report.violations().count(),
        "Thresholds evaluated"
    );
    report
}
