use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state, ready while the listener accepts connections.
#[derive(Clone, Debug, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state, initially not ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// # Errors
///
/// Returns an error if installing the recorder or binding the metrics HTTP
/// server fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check handler - returns 200 if the process is running.
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Readiness check handler - returns 200 if ready, 503 if not.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

/// Gauges.
pub mod gauges {
    /// Increment the open connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("eventsub_connections_active").increment(1.0);
    }

    /// Decrement the open connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("eventsub_connections_active").decrement(1.0);
    }

    /// Record how many message ids the replay cache holds.
    #[allow(clippy::cast_precision_loss)]
    pub fn replay_cache_size(len: usize) {
        metrics::gauge!("eventsub_replay_cache_size").set(len as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Record a handled request with its outcome label.
    pub fn requests_total(outcome: &'static str) {
        metrics::counter!("eventsub_requests_total", "outcome" => outcome).increment(1);
    }

    /// Increment the refused-connections counter.
    pub fn connections_refused_total() {
        metrics::counter!("eventsub_connections_refused_total").increment(1);
    }

    /// Increment the counter of ids refused because the replay cache was full.
    pub fn replay_cache_full_total() {
        metrics::counter!("eventsub_replay_cache_full_total").increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record the time spent authenticating and routing one request.
    pub fn request_seconds(value: f64) {
        metrics::histogram!("eventsub_request_seconds").record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_starts_not_ready() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.set_ready(true);
        assert!(state.clone().is_ready());
    }

    #[tokio::test]
    async fn ready_handler_reflects_state() {
        let state = HealthState::new();
        let (status, _) = ready_handler(state.clone()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        state.set_ready(true);
        let (status, Json(body)) = ready_handler(state).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ready);
    }
}
