// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Live Prometheus metrics for a run.
//!
//! Each run owns its own registry; nothing is registered globally.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Latency buckets in seconds, 5 ms to 10 s.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.4, 0.75, 1.0, 2.5, 5.0, 10.0,
];

/// Counters and gauges updated while the run is in progress.
#[derive(Clone)]
pub struct HarnessMetrics {
    registry: Registry,
    requests: IntCounterVec,
    request_duration: HistogramVec,
    checks: IntCounterVec,
    dropped_ticks: IntCounter,
    workers_allocated: IntGauge,
    in_flight: IntGauge,
}

impl HarnessMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("loadgen_requests_total", "Completed ticks by tag and outcome"),
            &["tag", "outcome"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "loadgen_request_duration_seconds",
                "Latency of dispatched requests",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["tag"],
        )?;
        let checks = IntCounterVec::new(
            Opts::new("loadgen_checks_total", "Check evaluations by check and result"),
            &["check", "result"],
        )?;
        let dropped_ticks = IntCounter::new(
            "loadgen_dropped_ticks_total",
            "Ticks dropped because the worker pool was saturated",
        )?;
        let workers_allocated =
            IntGauge::new("loadgen_workers_allocated", "Workers currently allocated")?;
        let in_flight = IntGauge::new("loadgen_requests_in_flight", "Requests in flight")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(dropped_ticks.clone()))?;
        registry.register(Box::new(workers_allocated.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            requests,
            request_duration,
            checks,
            dropped_ticks,
            workers_allocated,
            in_flight,
        })
    }

    /// Record a completed tick. Latency is only observed for dispatched requests.
    pub fn record_request(&self, tag: &str, success: bool, latency: Option<Duration>) {
        let outcome = if success { "success" } else { "failure" };
        self.requests.with_label_values(&[tag, outcome]).inc();
        if let Some(latency) = latency {
            self.request_duration
                .with_label_values(&[tag])
                .observe(latency.as_secs_f64());
        }
    }

    pub fn record_check(&self, check: &str, passed: bool) {
        let result = if passed { "pass" } else { "fail" };
        self.checks.with_label_values(&[check, result]).inc();
    }

    pub fn record_dropped(&self) {
        self.dropped_ticks.inc();
    }

    pub fn set_workers_allocated(&self, workers: usize) {
        self.workers_allocated.set(workers as i64);
    }

    pub fn request_started(&self) {
        self.in_flight.inc();
    }

    pub fn request_finished(&self) {
        self.in_flight.dec();
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks.get()
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
