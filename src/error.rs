// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the load generator.
//!
//! Only configuration and setup errors are fatal. Everything that can go
//! wrong while the run is in progress is recorded as a failed sample or a
//! failed check instead.

use std::time::Duration;
use thiserror::Error;

/// Invalid run configuration. Detected before the run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid arrival rate {0}: must be a finite number greater than zero")]
    InvalidRate(f64),

    #[error("Invalid duration: {0}")]
    InvalidDuration(&'static str),

    #[error("Invalid worker bounds: min_workers={min}, max_workers={max}")]
    InvalidWorkerBounds { min: usize, max: usize },

    #[error("Invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid threshold {metric}: '{expression}': {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("Unknown threshold metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid metrics bind address: {0}")]
    InvalidBindAddr(String),

    #[error("Invalid metrics path {path}: {reason}")]
    InvalidMetricsPath { path: String, reason: &'static str },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid check {name}: {reason}")]
    InvalidCheck { name: String, reason: String },
}

/// Transport-level failure of a single request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {latency:?}")]
    Timeout { latency: Duration },

    #[error("Connection refused or host unreachable")]
    Connect { latency: Duration },

    #[error("Failed to read response body")]
    Body { latency: Duration },

    #[error("Failed to build request: {reason}")]
    Request { reason: String },

    #[error("Unknown network error")]
    Other { latency: Duration },
}

impl TransportError {
    /// Time spent before the failure was observed.
    pub fn latency(&self) -> Duration {
        match self {
            Self::Timeout { latency }
            | Self::Connect { latency }
            | Self::Body { latency }
            | Self::Other { latency } => *latency,
            Self::Request { .. } => Duration::ZERO,
        }
    }

    /// Short machine-friendly label.
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::Connect { .. } => TransportErrorKind::Connect,
            Self::Body { .. } => TransportErrorKind::Body,
            Self::Request { .. } => TransportErrorKind::Request,
            Self::Other { .. } => TransportErrorKind::Other,
        }
    }
}

/// Transport failure classes, as carried on samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Body,
    Request,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Body => write!(f, "body"),
            Self::Request => write!(f, "request"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A check that could not be evaluated. Counted as a failed check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Response body is not JSON")]
    NotJson,

    #[error("Check panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Custom(String),
}

/// Fatal error while setting up a run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;
