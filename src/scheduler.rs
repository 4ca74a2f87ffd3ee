// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Constant arrival-rate scheduler.
//!
//! Ticks are issued on a fixed timetable (`start + n / rate` in the steady
//! phase) no matter how long earlier requests take. Each tick borrows a
//! worker from the elastic pool; when the pool is saturated the configured
//! [`SaturationPolicy`] decides between dropping the tick and queueing it
//! briefly.
//!
//! Lifecycle: `Idle → Ramping → Steady → Draining → Done`. Draining waits
//! for in-flight work up to the grace period and then force-cancels the
//! rest. Every tick ends up either executed or abandoned, so the workload
//! sees exactly one terminal event per tick.

use crate::config::{LoadConfig, SaturationPolicy};
use crate::metrics::HarnessMetrics;
use crate::pool::WorkerPool;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ramping,
    Steady,
    Draining,
    Done,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ramping => write!(f, "ramping"),
            Self::Steady => write!(f, "steady"),
            Self::Draining => write!(f, "draining"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// One scheduled invocation.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub index: u64,
    pub scheduled_at: Instant,
}

/// Why a job never ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// No worker became available
    Dropped,
    /// Cancelled after the drain grace period
    Cancelled,
}

/// Builds the job for each tick. Called on the scheduler loop, in tick order.
pub trait JobSource: Send {
    type Job: Send + Sync + 'static;

    fn next_job(&mut self, tick: &Tick) -> Self::Job;
}

/// Executes jobs on workers.
pub trait Workload: Send + Sync + 'static {
    type Job: Send + Sync + 'static;

    /// Run a job to completion, recording its outcome.
    fn execute(&self, job: &Self::Job) -> impl Future<Output = ()> + Send;

    /// Record a job that will never complete.
    fn abandon(&self, job: Self::Job, reason: AbandonReason);
}

/// Timing parameters for a run.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub rate: f64,
    pub duration: Duration,
    pub ramp_up: Duration,
    pub min_workers: usize,
    pub max_workers: usize,
    pub saturation: SaturationPolicy,
    pub grace_period: Duration,
}

impl From<&LoadConfig> for SchedulerConfig {
    fn from(load: &LoadConfig) -> Self {
        Self {
            rate: load.rate,
            duration: load.duration(),
            ramp_up: load.ramp_up(),
            min_workers: load.min_workers,
            max_workers: load.max_workers,
            saturation: load.saturation,
            grace_period: load.grace_period(),
        }
    }
}

/// Tick timetable relative to the start of the run.
#[derive(Debug, Clone, Copy)]
pub struct TickSchedule {
    rate: f64,
    ramp_secs: f64,
    steady_secs: f64,
    ramp_ticks: u64,
    steady_ticks: u64,
}

impl TickSchedule {
    pub fn new(rate: f64, duration: Duration, ramp_up: Duration) -> Self {
        let ramp_secs = ramp_up.as_secs_f64();
        // Linear ramp from 0 to `rate` issues rate * T / 2 ticks
        let ramp_ticks = (rate * ramp_secs / 2.0).floor() as u64;
        // Tolerance keeps 10/s over 1s at exactly 10 ticks despite rounding
        let steady_ticks = (rate * duration.as_secs_f64() - 1e-9).ceil().max(0.0) as u64;

        Self {
            rate,
            ramp_secs,
            steady_secs: duration.as_secs_f64(),
            ramp_ticks,
            steady_ticks,
        }
    }

    pub fn ramp_ticks(&self) -> u64 {
        self.ramp_ticks
    }

    pub fn total_ticks(&self) -> u64 {
        self.ramp_ticks + self.steady_ticks
    }

    /// Length of the issuing window: ramp-up plus steady duration.
    pub fn span(&self) -> Duration {
        Duration::from_secs_f64(self.ramp_secs + self.steady_secs)
    }

    /// Offset of tick `n` from the start, `None` once the schedule is exhausted.
    pub fn offset(&self, n: u64) -> Option<Duration> {
        if n < self.ramp_ticks {
            let secs = (2.0 * n as f64 * self.ramp_secs / self.rate).sqrt();
            return Some(Duration::from_secs_f64(secs));
        }
        let k = n - self.ramp_ticks;
        if k < self.steady_ticks {
            Some(Duration::from_secs_f64(self.ramp_secs + k as f64 / self.rate))
        } else {
            None
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    /// Ticks issued, including dropped ones
    pub ticks: u64,
    pub ramp_ticks: u64,
    pub dropped: u64,
    pub cancelled: u64,
    pub peak_workers: usize,
    /// Time spent issuing ticks; rates are computed over this
    pub issuing: Duration,
    /// Wall time including drain and grace period
    pub elapsed: Duration,
    /// Stop signal received before the schedule was exhausted
    pub stopped_early: bool,
}

#[derive(Debug, Default)]
struct Counters {
    dropped: AtomicU64,
    cancelled: AtomicU64,
}

pub struct ArrivalRateScheduler {
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
    metrics: Option<Arc<HarnessMetrics>>,
}

impl ArrivalRateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            config,
            state,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<HarnessMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    fn transition(&self, next: SchedulerState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "Scheduler state changed");
    }

    /// Issue ticks until the schedule is exhausted or `stop` turns true,
    /// then drain.
    pub async fn run<S, W>(
        self,
        mut source: S,
        workload: Arc<W>,
        mut stop: watch::Receiver<bool>,
    ) -> SchedulerReport
    where
        S: JobSource<Job = W::Job>,
        W: Workload,
    {
        let schedule = TickSchedule::new(self.config.rate, self.config.duration, self.config.ramp_up);
        let mut pool = WorkerPool::new(self.config.min_workers, self.config.max_workers);
        if let Some(metrics) = &self.metrics {
            pool = pool.with_metrics(Arc::clone(metrics));
        }
        let pool = Arc::new(pool);
        let counters = Arc::new(Counters::default());
        let (abort_tx, abort_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        info!(
            rate = self.config.rate,
            duration_secs = self.config.duration.as_secs_f64(),
            ramp_up_secs = self.config.ramp_up.as_secs_f64(),
            ticks = schedule.total_ticks(),
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            "Starting arrival-rate schedule"
        );

        let start = Instant::now();
        let mut stopped_early = false;
        let mut ticks = 0u64;

        if schedule.ramp_ticks() > 0 {
            self.transition(SchedulerState::Ramping);
        } else {
            self.transition(SchedulerState::Steady);
        }

        while let Some(offset) = schedule.offset(ticks) {
            if ticks == schedule.ramp_ticks() && ticks > 0 {
                self.transition(SchedulerState::Steady);
            }

            let scheduled_at = start + offset;
            tokio::select! {
                biased;
                _ = signalled(&mut stop) => {
                    stopped_early = true;
                    break;
                }
                _ = sleep_until(scheduled_at) => {}
            }

            let tick = Tick {
                index: ticks,
                scheduled_at,
            };
            let job = source.next_job(&tick);
            self.dispatch(job, &pool, &workload, &abort_rx, &counters, &mut tasks);
            ticks += 1;

            while let Some(result) = tasks.try_join_next() {
                log_join(result);
            }
        }

        let issuing = if stopped_early {
            warn!(ticks, "Stop requested, draining early");
            start.elapsed()
        } else {
            schedule.span()
        };
        self.transition(SchedulerState::Draining);

        let in_flight = tasks.len();
        let drained = tokio::time::timeout(self.config.grace_period, drain(&mut tasks))
            .await
            .is_ok();
        if !drained {
            warn!(
                remaining = tasks.len(),
                grace_period_ms = self.config.grace_period.as_millis() as u64,
                "Grace period expired, cancelling in-flight requests"
            );
            let _ = abort_tx.send(true);
            drain(&mut tasks).await;
        } else {
            debug!(in_flight, "Drained in-flight requests");
        }

        let report = SchedulerReport {
            ticks,
            ramp_ticks: schedule.ramp_ticks().min(ticks),
            dropped: counters.dropped.load(Ordering::Acquire),
            cancelled: counters.cancelled.load(Ordering::Acquire),
            peak_workers: pool.allocated(),
            issuing,
            elapsed: start.elapsed(),
            stopped_early,
        };
        self.transition(SchedulerState::Done);

        info!(
            ticks = report.ticks,
            dropped = report.dropped,
            cancelled = report.cancelled,
            peak_workers = report.peak_workers,
            issuing_ms = report.issuing.as_millis() as u64,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Schedule finished"
        );
        report
    }

    fn dispatch<W: Workload>(
        &self,
        job: W::Job,
        pool: &Arc<WorkerPool>,
        workload: &Arc<W>,
        abort: &watch::Receiver<bool>,
        counters: &Arc<Counters>,
        tasks: &mut JoinSet<()>,
    ) {
        if let Some(permit) = pool.try_acquire() {
            tasks.spawn(run_job(
                Arc::clone(workload),
                job,
                permit,
                abort.clone(),
                Arc::clone(counters),
            ));
            return;
        }

        match self.config.saturation {
            SaturationPolicy::Drop => {
                debug!(max_workers = pool.max_workers(), "Worker pool saturated, dropping tick");
                counters.dropped.fetch_add(1, Ordering::AcqRel);
                workload.abandon(job, AbandonReason::Dropped);
            }
            SaturationPolicy::Queue { max_wait_ms } => {
                let pool = Arc::clone(pool);
                let workload = Arc::clone(workload);
                let counters = Arc::clone(counters);
                let mut abort = abort.clone();
                let max_wait = Duration::from_millis(max_wait_ms);

                tasks.spawn(async move {
                    let permit = tokio::select! {
                        permit = pool.acquire_within(max_wait) => permit,
                        _ = signalled(&mut abort) => {
                            counters.cancelled.fetch_add(1, Ordering::AcqRel);
                            workload.abandon(job, AbandonReason::Cancelled);
                            return;
                        }
                    };
                    match permit {
                        Some(permit) => run_job(workload, job, permit, abort, counters).await,
                        None => {
                            debug!(max_wait_ms, "No worker freed up in time, dropping tick");
                            counters.dropped.fetch_add(1, Ordering::AcqRel);
                            workload.abandon(job, AbandonReason::Dropped);
                        }
                    }
                });
            }
        }
    }
}

/// Execute a job on a worker, giving up when the abort signal fires.
async fn run_job<W: Workload>(
    workload: Arc<W>,
    job: W::Job,
    _permit: OwnedSemaphorePermit,
    mut abort: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    let completed = tokio::select! {
        _ = workload.execute(&job) => true,
        _ = signalled(&mut abort) => false,
    };
    if !completed {
        counters.cancelled.fetch_add(1, Ordering::AcqRel);
        workload.abandon(job, AbandonReason::Cancelled);
    }
}

/// Resolves once the flag is true. Never resolves if the sender goes away.
async fn signalled(flag: &mut watch::Receiver<bool>) {
    while !*flag.borrow_and_update() {
        if flag.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        log_join(result);
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Worker task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Workload that sleeps for a fixed latency and records what happened.
    #[derive(Default)]
    struct SleepWorkload {
        latency: Duration,
        completed: Mutex<Vec<u64>>,
        abandoned: Mutex<Vec<(u64, AbandonReason)>>,
    }

    impl SleepWorkload {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                ..Default::default()
            })
        }

        fn completed(&self) -> usize {
            self.completed.lock().unwrap().len()
        }

        fn abandoned(&self, reason: AbandonReason) -> usize {
            self.abandoned
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, r)| *r == reason)
                .count()
        }
    }

    impl Workload for SleepWorkload {
        type Job = u64;

        async fn execute(&self, job: &u64) {
            tokio::time::sleep(self.latency).await;
            self.completed.lock().unwrap().push(*job);
        }

        fn abandon(&self, job: u64, reason: AbandonReason) {
            self.abandoned.lock().unwrap().push((job, reason));
        }
    }

    struct TickIndex;

    impl JobSource for TickIndex {
        type Job = u64;

        fn next_job(&mut self, tick: &Tick) -> u64 {
            tick.index
        }
    }

    fn config(rate: f64, duration_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            rate,
            duration: Duration::from_millis(duration_ms),
            ramp_up: Duration::ZERO,
            min_workers: 1,
            max_workers: 10_000,
            saturation: SaturationPolicy::Drop,
            grace_period: Duration::from_secs(30),
        }
    }

    fn never_stop() -> watch::Receiver<bool> {
        // A closed channel never signals
        let (_, rx) = watch::channel(false);
        rx
    }

    #[test]
    fn test_steady_offsets_are_n_over_rate() {
        let schedule = TickSchedule::new(10.0, Duration::from_secs(1), Duration::ZERO);
        assert_eq!(schedule.total_ticks(), 10);
        assert_eq!(schedule.offset(0), Some(Duration::ZERO));
        assert_eq!(schedule.offset(3), Some(Duration::from_millis(300)));
        assert_eq!(schedule.offset(10), None);
    }

    #[test]
    fn test_fractional_rate_schedule() {
        let schedule = TickSchedule::new(0.5, Duration::from_secs(3), Duration::ZERO);
        assert_eq!(schedule.total_ticks(), 2);
        assert_eq!(schedule.offset(1), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_ramp_offsets_are_monotonic() {
        let schedule = TickSchedule::new(100.0, Duration::from_secs(2), Duration::from_secs(4));
        assert_eq!(schedule.ramp_ticks(), 200);
        assert_eq!(schedule.total_ticks(), 400);

        let offsets: Vec<Duration> = (0..schedule.total_ticks())
            .map(|n| schedule.offset(n).unwrap())
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        // Steady phase begins when the ramp ends
        assert_eq!(offsets[200], Duration::from_secs(4));
        // Gaps shrink towards 1/rate as the ramp completes
        assert!(offsets[1] - offsets[0] > offsets[199] - offsets[198]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_count_independent_of_latency() {
        for latency_ms in [1, 250, 3000] {
            let workload = SleepWorkload::new(Duration::from_millis(latency_ms));
            let scheduler = ArrivalRateScheduler::new(config(50.0, 2000));

            let report = scheduler
                .run(TickIndex, Arc::clone(&workload), never_stop())
                .await;

            assert_eq!(report.ticks, 100, "latency {}ms", latency_ms);
            assert_eq!(workload.completed(), 100);
            assert_eq!(report.dropped, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_requests_grow_the_pool() {
        let workload = SleepWorkload::new(Duration::from_millis(500));
        let mut cfg = config(20.0, 1000);
        cfg.min_workers = 2;
        cfg.max_workers = 50;

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        // 500ms at 20/s keeps ~10 requests in flight
        assert!(report.peak_workers >= 10, "peak {}", report.peak_workers);
        assert!(report.peak_workers <= 12, "peak {}", report.peak_workers);
        assert_eq!(workload.completed(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_policy_records_dropped_ticks() {
        let workload = SleepWorkload::new(Duration::from_secs(5));
        let mut cfg = config(10.0, 1000);
        cfg.min_workers = 1;
        cfg.max_workers = 2;

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        assert_eq!(report.ticks, 10);
        assert_eq!(report.dropped, 8);
        assert_eq!(workload.completed(), 2);
        assert_eq!(workload.abandoned(AbandonReason::Dropped), 8);
        assert_eq!(report.peak_workers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_policy_waits_for_free_worker() {
        // One worker, 150ms per request, a tick every 100ms: the k-th tick
        // waits 50k ms, always under the 500ms limit.
        let workload = SleepWorkload::new(Duration::from_millis(150));
        let mut cfg = config(10.0, 1000);
        cfg.min_workers = 1;
        cfg.max_workers = 1;
        cfg.saturation = SaturationPolicy::Queue { max_wait_ms: 500 };

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        assert_eq!(report.dropped, 0);
        assert_eq!(workload.completed(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_policy_drops_after_max_wait() {
        let workload = SleepWorkload::new(Duration::from_millis(400));
        let mut cfg = config(10.0, 1000);
        cfg.min_workers = 1;
        cfg.max_workers = 1;
        cfg.saturation = SaturationPolicy::Queue { max_wait_ms: 120 };

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        assert!(report.dropped > 0);
        assert_eq!(workload.completed() as u64 + report.dropped, report.ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_drains_early() {
        let workload = SleepWorkload::new(Duration::from_millis(50));
        let (stop_tx, stop_rx) = watch::channel(false);

        let scheduler = ArrivalRateScheduler::new(config(10.0, 10_000));
        let states = scheduler.subscribe();
        let run = tokio::spawn(scheduler.run(TickIndex, Arc::clone(&workload), stop_rx));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        stop_tx.send(true).unwrap();
        let report = run.await.unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.ticks, 11);
        assert_eq!(workload.completed(), 11);
        assert_eq!(*states.borrow(), SchedulerState::Done);
        assert!(report.issuing >= Duration::from_millis(1050));
        assert!(report.issuing < Duration::from_millis(1100), "{:?}", report.issuing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_cancels_in_flight() {
        let workload = SleepWorkload::new(Duration::from_secs(60));
        let mut cfg = config(5.0, 1000);
        cfg.grace_period = Duration::from_secs(1);

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        assert_eq!(report.ticks, 5);
        assert_eq!(report.cancelled, 5);
        assert_eq!(workload.completed(), 0);
        assert_eq!(workload.abandoned(AbandonReason::Cancelled), 5);
        assert!(report.elapsed < Duration::from_secs(3));
        // The grace period is not part of the issuing window
        assert_eq!(report.issuing, Duration::from_secs(1));
        assert!(report.elapsed > report.issuing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_tick_has_one_terminal_event() {
        let workload = SleepWorkload::new(Duration::from_millis(700));
        let mut cfg = config(40.0, 1500);
        cfg.max_workers = 15;
        cfg.grace_period = Duration::from_millis(300);

        let report = ArrivalRateScheduler::new(cfg)
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        let mut seen: Vec<u64> = workload.completed.lock().unwrap().clone();
        seen.extend(workload.abandoned.lock().unwrap().iter().map(|(tick, _)| *tick));
        seen.sort_unstable();

        let expected: Vec<u64> = (0..report.ticks).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_then_steady() {
        let workload = SleepWorkload::new(Duration::from_millis(10));
        let mut cfg = config(20.0, 1000);
        cfg.ramp_up = Duration::from_secs(2);

        let scheduler = ArrivalRateScheduler::new(cfg);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let report = scheduler
            .run(TickIndex, Arc::clone(&workload), never_stop())
            .await;

        assert_eq!(report.ramp_ticks, 20);
        assert_eq!(report.ticks, 40);
        assert!(report.elapsed >= Duration::from_millis(2950));
        assert_eq!(report.issuing, Duration::from_secs(3));
    }
}
