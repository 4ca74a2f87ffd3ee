// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Order Acceptance Load Generator
//!
//! Runs one constant arrival-rate load test against the order acceptance
//! endpoint, prints a summary and exits with:
//!
//! - `0` when every threshold passed
//! - `99` when any threshold was crossed
//! - `1` on a fatal error (invalid configuration, unusable HTTP client)
//!
//! ## Configuration
//!
//! `LOADGEN_CONFIG` names an optional TOML/YAML/JSON file; `LOADGEN_*`
//! variables override it (see [`order_loadgen::config`]). A `.env` file in
//! the working directory is loaded first if present.
//!
//! Ctrl-C stops issuing ticks and drains in-flight requests.

use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_loadgen::{config::RunConfig, server, summary, LoadRun};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout is reserved for the summary
    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config_path = std::env::var("LOADGEN_CONFIG").ok();
    let config = match RunConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return Ok(ExitCode::FAILURE);
        }
    };
    let summary_config = config.summary.clone();
    let metrics_config = config.metrics.clone();

    let run = match LoadRun::new(config) {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "Invalid run configuration");
            return Ok(ExitCode::FAILURE);
        }
    };

    let metrics_server = metrics_config.enabled.then(|| {
        let metrics = run.metrics();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&metrics_config, metrics).await {
                error!(error = %e, "Metrics endpoint stopped");
            }
        })
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping run");
            let _ = stop_tx.send(true);
        }
    });

    let report = run.execute(stop_rx).await;

    if let Some(handle) = metrics_server {
        handle.abort();
    }

    summary::emit(&report, &summary_config)?;

    let code = report.exit_code();
    info!(
        passed = report.passed(),
        exit_code = code,
        "Run finished"
    );
    Ok(ExitCode::from(code))
}
