//! Request metrics middleware.
//!
//! Wraps every RPC request with the in-flight gauge, then records duration
//! and response size under `service.name`, `http.url` (request path),
//! `http.method` and `http.status_code`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use metrics::Label;

use crate::observability::metrics::{HTTP_METHOD_KEY, HTTP_URL_KEY, SERVICE_NAME_KEY};
use crate::observability::MetricsRecorder;

#[derive(Clone)]
pub struct MetricsState {
    pub recorder: Arc<MetricsRecorder>,
    pub service: Arc<str>,
}

impl MetricsState {
    pub fn new(recorder: Arc<MetricsRecorder>, service: impl Into<Arc<str>>) -> Self {
        Self {
            recorder,
            service: service.into(),
        }
    }
}

pub async fn metrics_middleware(
    State(state): State<MetricsState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();

    let in_flight = state.recorder.in_flight(vec![
        Label::new(SERVICE_NAME_KEY, state.service.to_string()),
        Label::new(HTTP_URL_KEY, path.clone()),
        Label::new(HTTP_METHOD_KEY, method.clone()),
    ]);
    let response = next.run(req).await;
    drop(in_flight);

    let code = response.status().as_u16().to_string();
    let attrs = MetricsRecorder::http_attributes(&state.service, &path, &method, &code);
    state.recorder.record_duration(start.elapsed(), &attrs);

    let size = response.body().size_hint();
    state
        .recorder
        .record_response_size(size.exact().unwrap_or(size.lower()), &attrs);

    response
}
