//! RPC handlers of `schema.v1.Service`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::connect::{self, RpcError};
use super::messages::{
    AnyFlag, EventStreamRequest, ResolveAllRequest, ResolveAllResponse, ResolveBooleanResponse,
    ResolveFloatResponse, ResolveIntResponse, ResolveObjectResponse, ResolveRequest,
    ResolveStringResponse,
};
use super::resolve::{resolve, ResponseSetter};
use crate::eval::{EvaluationContext, Evaluator, ResolveResult};
use crate::eventing::{Notification, NotificationBus};
use crate::lifecycle::Shutdown;
use crate::observability::MetricsRecorder;

/// Shared state of the RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    pub evaluator: Arc<dyn Evaluator>,
    pub metrics: Arc<MetricsRecorder>,
    pub bus: Arc<NotificationBus>,
    pub shutdown: Shutdown,
    pub frame_buffer: usize,
}

fn unary<T, R>(
    state: &RpcState,
    body: &[u8],
    resolver: impl FnOnce(&dyn Evaluator, &str, &str, &EvaluationContext) -> ResolveResult<T>,
) -> Result<Json<R>, RpcError>
where
    T: Default,
    R: ResponseSetter<T> + Default + Serialize,
{
    let request: ResolveRequest = connect::decode_unary(body)?;
    let evaluator = state.evaluator.as_ref();
    let mut response = R::default();
    resolve(
        |request_id, flag_key, context| resolver(evaluator, request_id, flag_key, context),
        &request.flag_key,
        &request.context,
        &mut response,
        &state.metrics,
    )?;
    Ok(Json(response))
}

pub async fn resolve_boolean(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveBooleanResponse>, RpcError> {
    unary(&state, &body, |e, id, key, ctx| e.resolve_boolean(id, key, ctx))
}

pub async fn resolve_string(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveStringResponse>, RpcError> {
    unary(&state, &body, |e, id, key, ctx| e.resolve_string(id, key, ctx))
}

pub async fn resolve_int(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveIntResponse>, RpcError> {
    unary(&state, &body, |e, id, key, ctx| e.resolve_int(id, key, ctx))
}

pub async fn resolve_float(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveFloatResponse>, RpcError> {
    unary(&state, &body, |e, id, key, ctx| e.resolve_float(id, key, ctx))
}

pub async fn resolve_object(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveObjectResponse>, RpcError> {
    unary(&state, &body, |e, id, key, ctx| e.resolve_object(id, key, ctx))
}

fn resolve_all_flags(evaluator: &dyn Evaluator, context: &EvaluationContext) -> ResolveAllResponse {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::debug_span!("resolve_all", request_id = %request_id);
    let _entered = span.enter();

    let flags = evaluator
        .resolve_all(&request_id, context)
        .into_iter()
        .map(|resolution| (resolution.flag_key.clone(), AnyFlag::from(resolution)))
        .collect();
    ResolveAllResponse { flags }
}

/// Resolve every flag. Per-flag impressions are not recorded here.
pub async fn resolve_all(
    State(state): State<RpcState>,
    body: Bytes,
) -> Result<Json<ResolveAllResponse>, RpcError> {
    let request: ResolveAllRequest = connect::decode_unary(&body)?;
    Ok(Json(resolve_all_flags(
        state.evaluator.as_ref(),
        &request.context,
    )))
}

fn stream_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, connect::CONTENT_TYPE_CONNECT_JSON)],
        body,
    )
        .into_response()
}

/// Encode notifications as envelopes, ending with an end-stream envelope.
fn frames(rx: mpsc::Receiver<Notification>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        loop {
            match rx.recv().await {
                Some(notification) => match connect::encode_message(&notification) {
                    Ok(frame) => return Some((Ok(frame), Some(rx))),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode notification"),
                },
                None => return Some((Ok(connect::end_stream(None)), None)),
            }
        }
    })
}

/// Open a server-streaming notification channel.
pub async fn event_stream(State(state): State<RpcState>, body: Bytes) -> Response {
    if let Err(err) = connect::decode_stream_request::<EventStreamRequest>(&body) {
        return stream_response(Body::from(connect::end_stream(Some(&err))));
    }
    if state.shutdown.is_triggered() {
        let err = RpcError::new(connect::Code::Unavailable, "server is shutting down");
        return stream_response(Body::from(connect::end_stream(Some(&err))));
    }

    let (tx, rx) = mpsc::channel(state.frame_buffer.max(1));
    let (id, _task) = state.bus.spawn_stream(tx, state.shutdown.subscribe());
    tracing::debug!(subscription = %id, "Event stream opened");

    stream_response(Body::from_stream(frames(rx)))
}
