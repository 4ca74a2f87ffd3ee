// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run-end aggregation of metric samples.

use crate::store::{MetricSample, SampleFailure};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counts and latencies for a set of samples.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pub count: u64,
    pub failed: u64,
    pub dropped: u64,
    pub cancelled: u64,
    /// Latencies of requests that reached the wire and finished, sorted ascending
    latencies_ms: Vec<f64>,
}

impl SampleSet {
    fn push(&mut self, sample: &MetricSample) {
        self.count += 1;
        if !sample.success {
            self.failed += 1;
        }
        match sample.failure {
            Some(SampleFailure::Dropped) => self.dropped += 1,
            Some(SampleFailure::Cancelled) => self.cancelled += 1,
            _ => self.latencies_ms.push(sample.latency_ms()),
        }
    }

    fn finish(&mut self) {
        self.latencies_ms.sort_by(f64::total_cmp);
    }

    /// Ratio of failed samples (0.0 when empty).
    pub fn failure_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.failed as f64 / self.count as f64
        }
    }

    /// Ticks that were dispatched to a worker.
    pub fn iterations(&self) -> u64 {
        self.count - self.dropped
    }

    pub fn latencies_ms(&self) -> &[f64] {
        &self.latencies_ms
    }

    pub fn min_ms(&self) -> f64 {
        self.latencies_ms.first().copied().unwrap_or(0.0)
    }

    pub fn max_ms(&self) -> f64 {
        self.latencies_ms.last().copied().unwrap_or(0.0)
    }

    pub fn avg_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        }
    }

    /// Percentile in [0, 100], linearly interpolated between closest ranks.
    pub fn percentile_ms(&self, p: f64) -> f64 {
        percentile(&self.latencies_ms, p)
    }

    pub fn latency_stats(&self) -> LatencyStats {
        LatencyStats {
            min: self.min_ms(),
            avg: self.avg_ms(),
            med: self.percentile_ms(50.0),
            p90: self.percentile_ms(90.0),
            p95: self.percentile_ms(95.0),
            p99: self.percentile_ms(99.0),
            max: self.max_ms(),
        }
    }
}

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Everything the thresholds and the summary need from the samples.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub all: SampleSet,
    pub by_tag: BTreeMap<String, SampleSet>,
    /// Sample counts by status code or failure class
    pub outcomes: BTreeMap<String, u64>,
    pub elapsed: Duration,
}

impl Aggregate {
    pub fn from_samples(samples: &[MetricSample], elapsed: Duration) -> Self {
        let mut aggregate = Self {
            elapsed,
            ..Default::default()
        };

        for sample in samples {
            aggregate.all.push(sample);
            aggregate
                .by_tag
                .entry(sample.tag.to_string())
                .or_default()
                .push(sample);
            *aggregate.outcomes.entry(outcome_key(sample)).or_insert(0) += 1;
        }

        aggregate.all.finish();
        for set in aggregate.by_tag.values_mut() {
            set.finish();
        }
        aggregate
    }

    /// Samples for one tag, or all samples when `tag` is `None`.
    /// Unknown tags select an empty set.
    pub fn select(&self, tag: Option<&str>) -> Cow<'_, SampleSet> {
        match tag {
            None => Cow::Borrowed(&self.all),
            Some(tag) => self
                .by_tag
                .get(tag)
                .map_or_else(|| Cow::Owned(SampleSet::default()), Cow::Borrowed),
        }
    }

    /// Samples per second of the issuing window.
    pub fn request_rate(&self, set: &SampleSet) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            set.count as f64 / secs
        } else {
            0.0
        }
    }
}

fn outcome_key(sample: &MetricSample) -> String {
    match (sample.status, sample.failure) {
        (_, Some(SampleFailure::Dropped)) => "dropped".to_string(),
        (_, Some(SampleFailure::Cancelled)) => "cancelled".to_string(),
        (_, Some(SampleFailure::Transport(kind))) => kind.to_string(),
        (Some(status), _) => status.to_string(),
        (None, _) => "unknown".to_string(),
    }
}

/// Linear-interpolated percentile of ascending `sorted` values.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}
