// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP request driver.
//!
//! Issues one POST per request and measures latency from dispatch until the
//! whole response body has been read. Transport failures come back as
//! [`TransportError`] values carrying the elapsed time; they are never
//! raised past the worker.

use crate::config::TargetConfig;
use crate::error::{ConfigError, HarnessError, TransportError};
use crate::payload::Request;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;
use url::Url;

/// A response as seen by the checks.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub latency: Duration,
    /// Parsed JSON body, `None` when the body is empty or not JSON
    pub body: Option<serde_json::Value>,
}

impl Response {
    /// Whether the status counts as a successful request (200..=399).
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Sends accept-order requests to the target.
#[derive(Clone)]
pub struct RequestDriver {
    client: reqwest::Client,
    url: Url,
}

impl RequestDriver {
    /// Create a driver for the configured target.
    pub fn new(target: &TargetConfig, max_idle_per_host: usize) -> Result<Self, HarnessError> {
        let url = target.url().map_err(HarnessError::from)?;
        let client = reqwest::Client::builder()
            .timeout(target.request_timeout())
            .pool_max_idle_per_host(max_idle_per_host)
            .build()?;

        Ok(Self { client, url })
    }

    /// Create a driver from an existing client.
    pub fn with_client(client: reqwest::Client, url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send one request and wait for the full response.
    pub async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let body = serde_json::to_vec(&request.body).map_err(|e| TransportError::Request {
            reason: e.to_string(),
        })?;

        let start = Instant::now();
        let result = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => return Err(classify(&e, start.elapsed())),
        };

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(&e, start.elapsed()))?;
        let latency = start.elapsed();

        trace!(
            tick = request.tick,
            tag = %request.tag,
            status,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Request completed"
        );

        Ok(Response {
            status,
            latency,
            body: serde_json::from_slice(&bytes).ok(),
        })
    }
}

/// Map a reqwest failure onto the transport error taxonomy.
fn classify(error: &reqwest::Error, latency: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout { latency }
    } else if error.is_connect() {
        TransportError::Connect { latency }
    } else if error.is_body() || error.is_decode() {
        TransportError::Body { latency }
    } else if error.is_builder() {
        TransportError::Request {
            reason: error.to_string(),
        }
    } else {
        TransportError::Other { latency }
    }
}
