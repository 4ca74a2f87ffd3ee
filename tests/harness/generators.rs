// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run configuration builders.

use order_loadgen::config::{LoadConfig, PayloadConfig, RunConfig, TargetConfig};
use std::collections::BTreeMap;
use std::net::TcpListener;

/// A short run against `base_url` with the default checks and thresholds.
pub fn run_config(base_url: &str, rate: f64, duration_secs: u64) -> RunConfig {
    RunConfig {
        target: TargetConfig {
            base_url: base_url.to_string(),
            request_timeout_ms: 5_000,
            ..Default::default()
        },
        load: LoadConfig {
            rate,
            duration_secs,
            min_workers: 2,
            max_workers: 50,
            grace_period_ms: 5_000,
            ..Default::default()
        },
        payload: PayloadConfig {
            seed: Some(7),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Thresholds from `(metric, expression)` pairs.
pub fn thresholds(rules: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (metric, expression) in rules {
        map.entry(metric.to_string())
            .or_default()
            .push(expression.to_string());
    }
    map
}

/// Base URL of a local port nothing is listening on.
pub fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
