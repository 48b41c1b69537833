use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::AdminState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Liveness: the process is serving.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness: 200 once the probe reports ready, 412 before.
pub async fn readyz(State(state): State<AdminState>) -> StatusCode {
    if (state.readiness)() {
        StatusCode::OK
    } else {
        StatusCode::PRECONDITION_FAILED
    }
}

pub async fn render_metrics(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.exporter.render(),
    )
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
