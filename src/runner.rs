// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run context: wires the payload generator, driver, checks, sample store
//! and scheduler together for one run, then aggregates the result.

use crate::aggregate::Aggregate;
use crate::checks::{CheckEngine, CheckSummary};
use crate::config::RunConfig;
use crate::driver::RequestDriver;
use crate::error::HarnessError;
use crate::metrics::HarnessMetrics;
use crate::payload::{PayloadGenerator, Request};
use crate::scheduler::{
    AbandonReason, ArrivalRateScheduler, JobSource, SchedulerConfig, SchedulerReport, Tick,
    TickSchedule, Workload,
};
use crate::store::{MetricSample, SampleFailure, SampleStore};
use crate::thresholds::{self, ThresholdReport, ThresholdRule};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Exit status when any threshold is crossed.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;

/// Pre-allocated sample capacity is capped so long runs grow on demand.
const MAX_PREALLOCATED_SAMPLES: u64 = 1_000_000;

/// Generates one accept-order request per tick.
pub struct PayloadSource {
    generator: PayloadGenerator,
    tag: Arc<str>,
}

impl PayloadSource {
    pub fn new(generator: PayloadGenerator, tag: impl Into<Arc<str>>) -> Self {
        Self {
            generator,
            tag: tag.into(),
        }
    }
}

impl JobSource for PayloadSource {
    type Job = Request;

    fn next_job(&mut self, tick: &Tick) -> Request {
        self.generator.request(tick.index, &self.tag)
    }
}

/// Sends requests, runs checks and records one sample per tick.
pub struct AcceptOrderWorkload {
    driver: RequestDriver,
    checks: Arc<CheckEngine>,
    store: Arc<SampleStore>,
    metrics: Arc<HarnessMetrics>,
}

impl AcceptOrderWorkload {
    pub fn new(
        driver: RequestDriver,
        checks: Arc<CheckEngine>,
        store: Arc<SampleStore>,
        metrics: Arc<HarnessMetrics>,
    ) -> Self {
        Self {
            driver,
            checks,
            store,
            metrics,
        }
    }

    fn record(&self, sample: MetricSample) {
        let latency = sample.has_latency().then_some(sample.latency);
        self.metrics
            .record_request(&sample.tag, sample.success, latency);
        self.store.record(sample);
    }
}

impl Workload for AcceptOrderWorkload {
    type Job = Request;

    async fn execute(&self, request: &Request) {
        let outcome = {
            let _in_flight = InFlight::start(&self.metrics);
            self.driver.send(request).await
        };

        let tag = Arc::clone(&request.tag);
        let sample = match outcome {
            Ok(response) => {
                self.checks.evaluate(&tag, &response);
                if response.is_success() {
                    MetricSample::succeeded(request.tick, tag, response.status, response.latency)
                } else {
                    MetricSample::failed(
                        request.tick,
                        tag,
                        Some(response.status),
                        response.latency,
                        SampleFailure::Http(response.status),
                    )
                }
            }
            Err(e) => {
                debug!(tick = request.tick, error = %e, "Request failed");
                self.checks.fail_all(&tag);
                MetricSample::failed(
                    request.tick,
                    tag,
                    None,
                    e.latency(),
                    SampleFailure::Transport(e.kind()),
                )
            }
        };
        self.record(sample);
    }

    fn abandon(&self, request: Request, reason: AbandonReason) {
        let failure = match reason {
            AbandonReason::Dropped => {
                self.metrics.record_dropped();
                SampleFailure::Dropped
            }
            AbandonReason::Cancelled => {
                self.checks.fail_all(&request.tag);
                SampleFailure::Cancelled
            }
        };
        self.record(MetricSample::failed(
            request.tick,
            request.tag,
            None,
            Duration::ZERO,
            failure,
        ));
    }
}

/// Keeps the in-flight gauge up while a request is outstanding, including
/// when the request future is cancelled.
struct InFlight<'a>(&'a HarnessMetrics);

impl<'a> InFlight<'a> {
    fn start(metrics: &'a HarnessMetrics) -> Self {
        metrics.request_started();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.request_finished();
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub rate: f64,
    pub scheduler: SchedulerReport,
    pub aggregate: Aggregate,
    pub checks: CheckSummary,
    pub thresholds: ThresholdReport,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.thresholds.passed()
    }

    /// Process exit status: 0 when every threshold passed.
    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            EXIT_THRESHOLDS_FAILED
        }
    }
}

/// A validated, ready-to-start run.
///
/// ```no_run
/// # tokio_test::block_on(async {
/// use order_loadgen::{LoadRun, RunConfig};
/// use tokio::sync::watch;
///
/// let run = LoadRun::new(RunConfig::default()).unwrap();
/// let (_stop, stop_rx) = watch::channel(false);
/// let report = run.execute(stop_rx).await;
/// std::process::exit(report.exit_code().into());
/// # });
/// ```
pub struct LoadRun {
    config: RunConfig,
    rules: Vec<ThresholdRule>,
    driver: RequestDriver,
    metrics: Arc<HarnessMetrics>,
}

impl LoadRun {
    /// Validate the configuration and build the HTTP client and metrics.
    pub fn new(config: RunConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let rules = ThresholdRule::parse_all(&config.thresholds)?;
        let driver = RequestDriver::new(&config.target, config.load.max_workers)?;
        let metrics = Arc::new(HarnessMetrics::new()?);

        Ok(Self {
            config,
            rules,
            driver,
            metrics,
        })
    }

    /// Live metrics for this run, for serving while it executes.
    pub fn metrics(&self) -> Arc<HarnessMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the schedule to completion (or until `stop` turns true) and
    /// evaluate thresholds.
    pub async fn execute(self, stop: watch::Receiver<bool>) -> RunReport {
        let load = &self.config.load;
        let expected = TickSchedule::new(load.rate, load.duration(), load.ramp_up()).total_ticks();
        let store = Arc::new(SampleStore::with_capacity(
            expected.min(MAX_PREALLOCATED_SAMPLES) as usize,
        ));
        let checks = Arc::new(
            CheckEngine::from_config(&self.config.checks).with_metrics(Arc::clone(&self.metrics)),
        );
        let workload = Arc::new(AcceptOrderWorkload::new(
            self.driver.clone(),
            Arc::clone(&checks),
            Arc::clone(&store),
            Arc::clone(&self.metrics),
        ));
        let source = PayloadSource::new(
            PayloadGenerator::new(&self.config.payload),
            self.config.target.tag.as_str(),
        );

        info!(
            url = %self.driver.url(),
            tag = %self.config.target.tag,
            rate = load.rate,
            checks = checks.len(),
            thresholds = self.rules.len(),
            "Starting load run"
        );

        let scheduler = ArrivalRateScheduler::new(SchedulerConfig::from(load))
            .with_metrics(Arc::clone(&self.metrics));
        let report = scheduler.run(source, workload, stop).await;

        let samples = store.drain();
        debug!(samples = samples.len(), ticks = report.ticks, "Aggregating samples");
        let aggregate = Aggregate::from_samples(&samples, report.issuing);
        let checks = checks.summary();
        let thresholds = thresholds::evaluate(&self.rules, &aggregate, &checks);

        RunReport {
            target: self.driver.url().to_string(),
            rate: load.rate,
            scheduler: report,
            aggregate,
            checks,
            thresholds,
        }
    }
}
