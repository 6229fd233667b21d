//! Probe and metrics endpoints
//!
//! - `GET /healthz`: the process is up
//! - `GET /readyz`: the last evaluation converged
//! - `GET /metrics`: Prometheus text format

use crate::error::ProvisionerError;
use crate::metrics::Metrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// State shared between the reconcile loop and the HTTP handlers
#[derive(Debug, Clone)]
pub struct ProbeState {
    pub metrics: Arc<Metrics>,
    ready: Arc<AtomicBool>,
}

impl ProbeState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

pub fn routes(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn readyz(State(state): State<ProbeState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not converged")
    }
}

async fn metrics(State(state): State<ProbeState>) -> impl IntoResponse {
    match state.metrics.encode_as_text() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the probe endpoints until the process exits
pub async fn serve(addr: SocketAddr, state: ProbeState) -> Result<(), ProvisionerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving /healthz, /readyz and /metrics on {}", addr);
    axum::serve(listener, routes(state)).await?;
    Ok(())
}
