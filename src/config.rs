// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for a load run.
//!
//! Defaults reproduce the accept-order scenario: 5000 req/s for three
//! minutes with 600 pre-allocated workers (2000 max), failing the run when
//! more than 1% of requests fail or p95 latency reaches 400 ms.
//!
//! Configuration is read from an optional file and then from environment
//! variables prefixed `LOADGEN_`, with `__` separating nested keys:
//!
//! - `LOADGEN_TARGET__BASE_URL`: Target base URL (default: http://localhost:8080)
//! - `LOADGEN_LOAD__RATE`: Requests per second (default: 5000)
//! - `LOADGEN_LOAD__DURATION_SECS`: Steady-state duration (default: 180)
//! - `LOADGEN_LOAD__MIN_WORKERS` / `LOADGEN_LOAD__MAX_WORKERS` (default: 600 / 2000)

use crate::error::ConfigError;
use crate::payload::{PackageType, MAX_EXPIRY_DAYS};
use crate::thresholds::ThresholdRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LOADGEN";

/// Complete configuration for one run. Immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target service
    #[serde(default)]
    pub target: TargetConfig,

    /// Arrival rate and worker pool
    #[serde(default)]
    pub load: LoadConfig,

    /// Request body generation
    #[serde(default)]
    pub payload: PayloadConfig,

    /// Named checks evaluated against every response
    #[serde(default = "default_checks")]
    pub checks: Vec<CheckConfig>,

    /// Threshold expressions keyed by metric, e.g. `http_req_failed = ["rate<0.01"]`
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Vec<String>>,

    /// Live metrics endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// End-of-run summary output
    #[serde(default)]
    pub summary: SummaryConfig,
}

/// Target service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the order service (default: http://localhost:8080)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the accept endpoint (default: /v1/orders/accept)
    #[serde(default = "default_path")]
    pub path: String,

    /// Tag attached to every sample for attribution (default: AcceptOrder)
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Per-request timeout in milliseconds (default: 60000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Arrival-rate and worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Target arrival rate in requests per second (default: 5000)
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Steady-state duration in seconds (default: 180)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Linear ramp from zero to `rate` before the steady phase (default: 0)
    #[serde(default)]
    pub ramp_up_secs: u64,

    /// Workers allocated up front (default: 600)
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Upper bound for the elastic pool (default: 2000)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// What happens to a tick when all `max_workers` are busy
    #[serde(default)]
    pub saturation: SaturationPolicy,

    /// How long draining waits for in-flight requests (default: 30000)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

/// Handling of ticks that arrive while the pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Record the tick immediately as a failed, dropped sample.
    #[default]
    Drop,
    /// Wait up to `max_wait_ms` for a worker, then drop.
    Queue { max_wait_ms: u64 },
}

/// Request body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    /// Days between generation time and `expires_at` (default: 7)
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,

    /// Package type sent with every order (default: PACKAGE_TYPE_BOX)
    #[serde(default)]
    pub package: PackageType,

    /// Order weight (default: 1.5)
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Order price (default: 100.0)
    #[serde(default = "default_price")]
    pub price: f64,

    /// Seed for the identifier RNG; OS entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

/// A named check definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckConfig {
    /// Response status equals `expected`.
    Status { name: String, expected: u16 },
    /// Response body is JSON and contains `field`.
    JsonField { name: String, field: String },
    /// Response arrived within `max_ms`.
    MaxLatency { name: String, max_ms: u64 },
}

impl CheckConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Status { name, .. }
            | Self::JsonField { name, .. }
            | Self::MaxLatency { name, .. } => name,
        }
    }
}

/// Live metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics while the run is in progress (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Metrics server bind address (default: 0.0.0.0:9090)
    #[serde(default = "default_metrics_bind_addr")]
    pub bind_addr: String,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Summary output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Output format (default: text)
    #[serde(default)]
    pub format: SummaryFormat,

    /// Write to this file instead of stdout
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFormat {
    #[default]
    Text,
    Json,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_path() -> String {
    "/v1/orders/accept".to_string()
}

fn default_tag() -> String {
    "AcceptOrder".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_rate() -> f64 {
    5000.0
}

fn default_duration_secs() -> u64 {
    180
}

fn default_min_workers() -> usize {
    600
}

fn default_max_workers() -> usize {
    2000
}

fn default_grace_period_ms() -> u64 {
    30_000
}

fn default_expiry_days() -> i64 {
    7
}

fn default_weight() -> f64 {
    1.5
}

fn default_price() -> f64 {
    100.0
}

fn default_metrics_bind_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_checks() -> Vec<CheckConfig> {
    vec![
        CheckConfig::Status {
            name: "200 OK".to_string(),
            expected: 200,
        },
        CheckConfig::JsonField {
            name: "order_id returned".to_string(),
            field: "order_id".to_string(),
        },
    ]
}

fn default_thresholds() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("http_req_failed".to_string(), vec!["rate<0.01".to_string()]),
        ("http_req_duration".to_string(), vec!["p(95)<400".to_string()]),
    ])
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            load: LoadConfig::default(),
            payload: PayloadConfig::default(),
            checks: default_checks(),
            thresholds: default_thresholds(),
            metrics: MetricsConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_path(),
            tag: default_tag(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            duration_secs: default_duration_secs(),
            ramp_up_secs: 0,
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            saturation: SaturationPolicy::default(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_expiry_days(),
            package: PackageType::default(),
            weight: default_weight(),
            price: default_price(),
            seed: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_bind_addr(),
            path: default_metrics_path(),
        }
    }
}

impl RunConfig {
    /// Load configuration from an optional file, then `LOADGEN_*` variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&str>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load.validate()?;
        self.target.url()?;

        if self.target.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidDuration(
                "request_timeout_ms must be greater than zero",
            ));
        }

        for check in &self.checks {
            if check.name().trim().is_empty() {
                return Err(ConfigError::InvalidCheck {
                    name: check.name().to_string(),
                    reason: "check name must not be empty".to_string(),
                });
            }
        }

        self.payload.validate()?;

        if self.metrics.enabled {
            self.metrics.socket_addr()?;
            self.metrics.validate_path()?;
        }

        ThresholdRule::parse_all(&self.thresholds)?;
        Ok(())
    }
}

impl PayloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_EXPIRY_DAYS).contains(&self.expiry_days) {
            return Err(ConfigError::InvalidPayload(format!(
                "expiry_days must be between 1 and {}, got {}",
                MAX_EXPIRY_DAYS, self.expiry_days
            )));
        }
        Ok(())
    }
}

impl MetricsConfig {
    /// The metrics path must be routable and must not shadow `/health`.
    pub fn validate_path(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidMetricsPath {
            path: self.path.clone(),
            reason,
        };
        if !self.path.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        if self.path == "/health" {
            return Err(invalid("conflicts with the health route"));
        }
        if self.path.contains(['{', '}', '*', ':']) {
            return Err(invalid("must be a literal path"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }
}

impl TargetConfig {
    /// Full URL of the accept endpoint.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), self.path);
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&raw).map_err(|e| invalid(&e.to_string()))?;

        // Only HTTP(S) targets can be driven
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }

        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::InvalidRate(self.rate));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::InvalidDuration(
                "duration_secs must be greater than zero",
            ));
        }
        if self.max_workers == 0 || self.min_workers > self.max_workers {
            return Err(ConfigError::InvalidWorkerBounds {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }

    /// Get the steady-state duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Get the ramp-up duration
    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_secs)
    }

    /// Get the drain grace period
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
