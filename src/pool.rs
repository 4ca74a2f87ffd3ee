// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Elastic worker pool.
//!
//! A worker is a permit: holding one allows a single request in flight. The
//! pool starts with `min_workers` permits and allocates one more whenever a
//! tick finds none free, until `max_workers` have been allocated. Allocated
//! workers are never released during a run.

use crate::metrics::HarnessMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    allocated: AtomicUsize,
    max_workers: usize,
    metrics: Option<Arc<HarnessMetrics>>,
}

impl WorkerPool {
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(min_workers)),
            allocated: AtomicUsize::new(min_workers),
            max_workers,
            metrics: None,
        }
    }

    pub fn with_metrics(self, metrics: Arc<HarnessMetrics>) -> Self {
        metrics.set_workers_allocated(self.allocated());
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    /// Take a free worker, growing the pool if needed. `None` when saturated.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        loop {
            if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
                return Some(permit);
            }
            if !self.grow() {
                return None;
            }
        }
    }

    /// Wait up to `wait` for a worker.
    pub async fn acquire_within(&self, wait: Duration) -> Option<OwnedSemaphorePermit> {
        if let Some(permit) = self.try_acquire() {
            return Some(permit);
        }
        tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned())
            .await
            .ok()?
            .ok()
    }

    /// Allocate one more worker if below the bound.
    fn grow(&self) -> bool {
        let mut current = self.allocated.load(Ordering::Acquire);
        loop {
            if current >= self.max_workers {
                return false;
            }
            match self.allocated.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.permits.add_permits(1);
                    debug!(workers = current + 1, max_workers = self.max_workers, "Worker pool grew");
                    if let Some(metrics) = &self.metrics {
                        metrics.set_workers_allocated(current + 1);
                    }
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Workers allocated so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Workers currently holding a request.
    pub fn busy(&self) -> usize {
        self.allocated()
            .saturating_sub(self.permits.available_permits())
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}
