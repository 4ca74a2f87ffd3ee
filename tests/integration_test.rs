// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-to-end load runs against a mock order service.

mod harness;

use harness::generators::{refused_base_url, run_config, thresholds};
use harness::target::{Behavior, MockTarget};
use order_loadgen::{
    config::SaturationPolicy,
    payload::{MAX_ORDER_ID, MAX_USER_ID},
    ConfigError, HarnessError, LoadRun, EXIT_THRESHOLDS_FAILED,
};
use std::time::Duration;
use tokio::sync::watch;

fn never_stop() -> watch::Receiver<bool> {
    let (_, rx) = watch::channel(false);
    rx
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_healthy_target_passes() {
    let target = MockTarget::start(Behavior::accepting()).await;
    let run = tokio_test::assert_ok!(LoadRun::new(run_config(&target.base_url(), 10.0, 1)));

    let report = run.execute(never_stop()).await;

    assert_eq!(report.scheduler.ticks, 10);
    assert_eq!(report.aggregate.all.count, 10);
    assert_eq!(report.aggregate.all.failed, 0);
    assert_eq!(target.hits(), 10);

    let ok = report.checks.get("200 OK").unwrap();
    assert_eq!((ok.passes, ok.fails), (10, 0));
    let order_id = report.checks.get("order_id returned").unwrap();
    assert_eq!((order_id.passes, order_id.fails), (10, 0));

    assert!(report.passed());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_target_fails_checks_and_thresholds() {
    let target = MockTarget::start(Behavior::failing()).await;
    let run = LoadRun::new(run_config(&target.base_url(), 10.0, 1)).unwrap();

    let report = run.execute(never_stop()).await;

    assert_eq!(report.aggregate.all.count, 10);
    assert_eq!(report.aggregate.all.failed, 10);
    assert_eq!(report.aggregate.outcomes["500"], 10);
    for name in ["200 OK", "order_id returned"] {
        let row = report.checks.get(name).unwrap();
        assert_eq!((row.passes, row.fails), (0, 10), "{}", name);
    }

    let failed = report
        .thresholds
        .results
        .iter()
        .find(|r| r.metric == "http_req_failed")
        .unwrap();
    assert!(!failed.passed);
    assert_eq!(failed.observed, 1.0);
    assert_eq!(report.exit_code(), EXIT_THRESHOLDS_FAILED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_target_records_transport_failures() {
    let mut config = run_config(&refused_base_url(), 10.0, 1);
    config.thresholds = thresholds(&[("http_req_failed", "rate<0.01")]);
    let run = LoadRun::new(config).unwrap();

    let report = run.execute(never_stop()).await;

    // The run carries on through every tick
    assert_eq!(report.scheduler.ticks, 10);
    assert_eq!(report.aggregate.all.count, 10);
    assert_eq!(report.aggregate.all.failed, 10);
    let transport: u64 = ["connect", "other"]
        .iter()
        .filter_map(|kind| report.aggregate.outcomes.get(*kind))
        .sum();
    assert_eq!(transport, 10);
    assert_eq!(report.checks.total_fails(), 20);
    assert!(!report.passed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_payloads_reach_target() {
    let target = MockTarget::start(Behavior::accepting()).await;
    let run = LoadRun::new(run_config(&target.base_url(), 5.0, 1)).unwrap();
    run.execute(never_stop()).await;

    let received = target.received();
    assert_eq!(received.len(), 5);
    for body in &received {
        let order_id = body["order_id"].as_u64().unwrap();
        let user_id = body["user_id"].as_u64().unwrap();
        assert!((1..=MAX_ORDER_ID).contains(&order_id));
        assert!((1..=MAX_USER_ID).contains(&user_id));
        assert_eq!(body["package"], "PACKAGE_TYPE_BOX");
        assert!(body["expires_at"].as_str().unwrap().ends_with('Z'));
    }
    assert!(target
        .content_types()
        .iter()
        .all(|ct| ct.starts_with("application/json")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_target_crosses_latency_threshold() {
    let target = MockTarget::start(Behavior::accepting().with_delay(Duration::from_millis(60))).await;
    let mut config = run_config(&target.base_url(), 10.0, 1);
    config.thresholds = thresholds(&[
        ("http_req_duration", "p(95)<30"),
        ("http_req_failed", "rate<0.01"),
    ]);
    let run = LoadRun::new(config).unwrap();

    let report = run.execute(never_stop()).await;

    let results = &report.thresholds.results;
    let duration = results.iter().find(|r| r.metric == "http_req_duration").unwrap();
    assert!(!duration.passed);
    assert!(duration.observed >= 60.0);
    let failed = results.iter().find(|r| r.metric == "http_req_failed").unwrap();
    assert!(failed.passed);
    assert_eq!(report.exit_code(), EXIT_THRESHOLDS_FAILED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_saturated_pool_drops_ticks() {
    let target = MockTarget::start(Behavior::accepting().with_delay(Duration::from_millis(400))).await;
    let mut config = run_config(&target.base_url(), 20.0, 1);
    config.load.min_workers = 1;
    config.load.max_workers = 2;
    config.load.saturation = SaturationPolicy::Drop;
    config.thresholds = thresholds(&[("dropped_iterations", "count==0")]);
    let run = LoadRun::new(config).unwrap();

    let report = run.execute(never_stop()).await;

    assert_eq!(report.scheduler.ticks, 20);
    assert!(report.scheduler.dropped > 0);
    assert_eq!(report.aggregate.all.dropped, report.scheduler.dropped);
    // Exactly one sample per tick, dropped or not
    assert_eq!(report.aggregate.all.count, report.scheduler.ticks);
    assert_eq!(
        target.hits() as u64,
        report.scheduler.ticks - report.scheduler.dropped
    );
    assert_eq!(report.scheduler.peak_workers, 2);
    assert!(!report.passed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_signal_ends_run_early() {
    let target = MockTarget::start(Behavior::accepting()).await;
    let run = LoadRun::new(run_config(&target.base_url(), 20.0, 60)).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);

    let handle = tokio::spawn(run.execute(stop_rx));
    tokio::time::sleep(Duration::from_millis(500)).await;
    stop_tx.send(true).unwrap();
    let report = handle.await.unwrap();

    assert!(report.scheduler.stopped_early);
    assert!(report.scheduler.ticks < 1200);
    assert_eq!(report.aggregate.all.count, report.scheduler.ticks);
}

#[tokio::test]
async fn test_invalid_configuration_is_fatal() {
    let mut config = run_config("http://localhost:8080", 0.0, 1);
    assert!(matches!(
        LoadRun::new(config.clone()),
        Err(HarnessError::Config(ConfigError::InvalidRate(_)))
    ));

    config.load.rate = 10.0;
    config.target.base_url = "localhost:8080".to_string();
    assert!(matches!(
        LoadRun::new(config.clone()),
        Err(HarnessError::Config(ConfigError::InvalidUrl { .. }))
    ));

    config.target.base_url = "http://localhost:8080".to_string();
    config.payload.expiry_days = 1_000_000_000;
    assert!(matches!(
        LoadRun::new(config.clone()),
        Err(HarnessError::Config(ConfigError::InvalidPayload(_)))
    ));

    config.payload.expiry_days = 7;
    config.metrics.enabled = true;
    config.metrics.path = "metrics".to_string();
    assert!(matches!(
        LoadRun::new(config.clone()),
        Err(HarnessError::Config(ConfigError::InvalidMetricsPath { .. }))
    ));

    config.metrics.enabled = false;
    config.thresholds = thresholds(&[("http_req_failed", "p(95)<0.01")]);
    assert!(matches!(
        LoadRun::new(config),
        Err(HarnessError::Config(ConfigError::InvalidThreshold { .. }))
    ));
}
