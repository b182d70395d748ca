//! zic-api: HTTP surface of the exporter.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus text exposition of every registered gauge |
//! | GET | `/healthz` | Liveness check |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use zic_metrics::GaugeRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: GaugeRegistry,
}

/// Build the exporter router.
pub fn build_router(registry: GaugeRegistry) -> Router {
    let state = ApiState { registry };

    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
