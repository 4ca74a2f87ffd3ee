// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Synthetic accept-order request bodies.
//!
//! Identifiers are drawn from an explicit ChaCha RNG so that a seeded run
//! produces the same payload sequence every time.

use crate::config::PayloadConfig;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest generated order identifier.
pub const MAX_ORDER_ID: u64 = 1_000_000_000_000;

/// Largest generated user identifier.
pub const MAX_USER_ID: u64 = 1_000_000;

/// Upper bound accepted for `expiry_days`.
pub const MAX_EXPIRY_DAYS: i64 = 36_500;

/// Packaging options understood by the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackageType {
    #[serde(rename = "PACKAGE_TYPE_BAG")]
    Bag,
    #[default]
    #[serde(rename = "PACKAGE_TYPE_BOX")]
    Box,
    #[serde(rename = "PACKAGE_TYPE_TAPE")]
    Tape,
    #[serde(rename = "PACKAGE_TYPE_BAG_TAPE")]
    BagTape,
    #[serde(rename = "PACKAGE_TYPE_BOX_TAPE")]
    BoxTape,
}

/// JSON body of an accept-order request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOrderPayload {
    pub order_id: u64,
    pub user_id: u64,
    /// ISO-8601 UTC timestamp with millisecond precision
    pub expires_at: String,
    pub package: PackageType,
    pub weight: f64,
    pub price: f64,
}

/// One request to issue for a tick.
#[derive(Debug, Clone)]
pub struct Request {
    /// Index of the tick that produced this request
    pub tick: u64,
    /// Metric attribution tag
    pub tag: Arc<str>,
    pub body: AcceptOrderPayload,
    pub generated_at: DateTime<Utc>,
}

/// Produces one payload per call.
pub struct PayloadGenerator {
    rng: ChaCha8Rng,
    expiry: ChronoDuration,
    package: PackageType,
    weight: f64,
    price: f64,
}

impl PayloadGenerator {
    /// Create a generator; seeded when `config.seed` is set.
    pub fn new(config: &PayloadConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Create a generator drawing from the given RNG.
    pub fn with_rng(config: &PayloadConfig, rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            expiry: ChronoDuration::try_days(config.expiry_days).unwrap_or_else(ChronoDuration::zero),
            package: config.package,
            weight: config.weight,
            price: config.price,
        }
    }

    /// Generate a payload as of the current wall-clock time.
    pub fn generate(&mut self) -> AcceptOrderPayload {
        self.generate_at(Utc::now())
    }

    /// Generate a payload as of `now`.
    pub fn generate_at(&mut self, now: DateTime<Utc>) -> AcceptOrderPayload {
        AcceptOrderPayload {
            order_id: self.rng.gen_range(1..=MAX_ORDER_ID),
            user_id: self.rng.gen_range(1..=MAX_USER_ID),
            expires_at: now
                .checked_add_signed(self.expiry)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            package: self.package,
            weight: self.weight,
            price: self.price,
        }
    }

    /// Build the request for `tick`.
    pub fn request(&mut self, tick: u64, tag: &Arc<str>) -> Request {
        let generated_at = Utc::now();
        Request {
            tick,
            tag: Arc::clone(tag),
            body: self.generate_at(generated_at),
            generated_at,
        }
    }
}
