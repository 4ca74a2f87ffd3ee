// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Order Acceptance Load Generator
//!
//! Drives the order acceptance endpoint at a constant arrival rate and
//! reports whether the service stayed within its performance budget:
//!
//! - Constant arrival rate (5000 req/s default) with optional linear ramp-up
//! - Elastic worker pool (600 pre-allocated, 2000 max)
//! - Randomised accept-order payloads
//! - Named response checks (`200 OK`, `order_id returned`)
//! - k6-style thresholds (`http_req_failed: rate<0.01`, `http_req_duration: p(95)<400`)
//! - Optional live Prometheus endpoint and a text or JSON summary

pub mod aggregate;
pub mod checks;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod pool;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod summary;
pub mod thresholds;

pub use config::RunConfig;
pub use error::{ConfigError, HarnessError, TransportError};
pub use runner::{LoadRun, RunReport, EXIT_THRESHOLDS_FAILED};
pub use scheduler::{ArrivalRateScheduler, SchedulerState};
