// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Live metrics endpoint served while a run is in progress.

use crate::config::MetricsConfig;
use crate::error::HarnessError;
use crate::metrics::HarnessMetrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "order-loadgen",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(metrics): State<Arc<HarnessMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(metrics: Arc<HarnessMetrics>, path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(path, get(self::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Bind the metrics endpoint and serve it until the task is aborted.
pub async fn serve(config: &MetricsConfig, metrics: Arc<HarnessMetrics>) -> Result<(), HarnessError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, path = %config.path, "Metrics endpoint listening");

    axum::serve(listener, router(metrics, &config.path)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(Arc::new(HarnessMetrics::new().unwrap()), "/metrics");
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"status\":\"healthy\""));
    }

    #[tokio::test]
    async fn test_metrics_exposes_live_counters() {
        let metrics = Arc::new(HarnessMetrics::new().unwrap());
        metrics.record_request("AcceptOrder", true, Some(Duration::from_millis(15)));
        metrics.set_workers_allocated(600);

        let app = router(Arc::clone(&metrics), "/custom/metrics");
        let response = app
            .oneshot(Request::get("/custom/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("loadgen_workers_allocated 600"));
        assert!(text.contains("loadgen_request_duration_seconds_count{tag=\"AcceptOrder\"} 1"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let app = router(Arc::new(HarnessMetrics::new().unwrap()), "/metrics");
        let response = app
            .oneshot(Request::get("/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
