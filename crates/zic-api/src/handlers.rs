//! Route handlers.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use prometheus::TextEncoder;
use tracing::{error, trace};

use crate::ApiState;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let families = state.registry.gather();
    trace!(families = families.len(), "rendering prometheus exposition");

    let mut body = String::new();
    if let Err(e) = TextEncoder::new().encode_utf8(&families, &mut body) {
        error!(error = %e, "cannot encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
