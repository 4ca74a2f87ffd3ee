// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only store of metric samples.

use crate::error::TransportErrorKind;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Why a sample counts as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SampleFailure {
    /// The target answered with an unsuccessful status
    Http(u16),
    /// The request never produced a response
    Transport(TransportErrorKind),
    /// No worker was available for the tick
    Dropped,
    /// Force-cancelled while draining
    Cancelled,
}

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub tick: u64,
    pub tag: Arc<str>,
    pub latency: Duration,
    pub success: bool,
    pub status: Option<u16>,
    pub failure: Option<SampleFailure>,
}

impl MetricSample {
    pub fn succeeded(tick: u64, tag: Arc<str>, status: u16, latency: Duration) -> Self {
        Self {
            tick,
            tag,
            latency,
            success: true,
            status: Some(status),
            failure: None,
        }
    }

    pub fn failed(
        tick: u64,
        tag: Arc<str>,
        status: Option<u16>,
        latency: Duration,
        failure: SampleFailure,
    ) -> Self {
        Self {
            tick,
            tag,
            latency,
            success: false,
            status,
            failure: Some(failure),
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    /// Whether a request was actually put on the wire for this tick.
    pub fn was_dispatched(&self) -> bool {
        self.failure != Some(SampleFailure::Dropped)
    }

    /// Whether `latency` is a measured request latency. Dropped and
    /// cancelled ticks carry none.
    pub fn has_latency(&self) -> bool {
        !matches!(
            self.failure,
            Some(SampleFailure::Dropped | SampleFailure::Cancelled)
        )
    }
}

/// Thread-safe sample store owned by the run context.
///
/// Appends are synchronous so a worker records its sample in the same poll
/// that observes the response.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Mutex<Vec<MetricSample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append a sample.
    pub fn record(&self, sample: MetricSample) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every recorded sample, leaving the store empty.
    pub fn drain(&self) -> Vec<MetricSample> {
        std::mem::take(&mut *self.samples.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
