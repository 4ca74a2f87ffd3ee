// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mock order service.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const ACCEPT_PATH: &str = "/v1/orders/accept";

/// How the mock answers every request.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub delay: Duration,
}

impl Behavior {
    /// 200 with `{"order_id": 42}`.
    pub fn accepting() -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(serde_json::json!({ "order_id": 42 })),
            delay: Duration::ZERO,
        }
    }

    /// 500 with an empty body.
    pub fn failing() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
}

struct TargetState {
    behavior: Behavior,
    hits: AtomicUsize,
    received: Mutex<Vec<Value>>,
    content_types: Mutex<Vec<String>>,
}

/// A running mock order service.
pub struct MockTarget {
    pub addr: SocketAddr,
    state: Arc<TargetState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockTarget {
    pub async fn start(behavior: Behavior) -> Self {
        let state = Arc::new(TargetState {
            behavior,
            hits: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            content_types: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route(ACCEPT_PATH, post(accept))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Request bodies received so far.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.state.content_types.lock().unwrap().clone()
    }
}

impl Drop for MockTarget {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept(
    State(state): State<Arc<TargetState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.received.lock().unwrap().push(body);
    if let Some(content_type) = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        state
            .content_types
            .lock()
            .unwrap()
            .push(content_type.to_string());
    }

    let behavior = &state.behavior;
    if !behavior.delay.is_zero() {
        tokio::time::sleep(behavior.delay).await;
    }
    match &behavior.body {
        Some(body) => (behavior.status, Json(body.clone())).into_response(),
        None => behavior.status.into_response(),
    }
}
