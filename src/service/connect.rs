//! Connect protocol codec (JSON).
//!
//! # Responsibilities
//! - RPC status codes and their HTTP mapping
//! - Unary request decoding and error bodies
//! - Streaming envelopes: `[flags: u8][length: u32 BE][json payload]`
//!
//! Unary calls are `POST /<service>/<method>` with a JSON body; an empty body
//! is an empty message. Streaming responses are a sequence of envelopes
//! terminated by one carrying [`FLAG_END_STREAM`].

use std::fmt;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CONNECT_JSON: &str = "application/connect+json";

pub const FLAG_COMPRESSED: u8 = 0x01;
pub const FLAG_END_STREAM: u8 = 0x02;

const ENVELOPE_HEADER_LEN: usize = 5;

/// RPC status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// HTTP status of a unary error response.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Canceled => StatusCode::REQUEST_TIMEOUT,
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                StatusCode::BAD_REQUEST
            }
            Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::Unimplemented => StatusCode::NOT_FOUND,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RPC failure: a status code and a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: Code,
    pub message: String,
}

impl RpcError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    fn body(&self) -> serde_json::Value {
        json!({ "code": self.code.as_str(), "message": self.message })
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (self.code.http_status(), Json(self.body())).into_response()
    }
}

/// Decode a unary request body. An empty body is the default message.
pub fn decode_unary<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, RpcError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RpcError::invalid_argument(format!("invalid request body: {e}")))
}

/// Split a buffer into `(flags, payload)` envelopes.
pub fn decode_envelopes(mut buf: &[u8]) -> Result<Vec<(u8, &[u8])>, RpcError> {
    let mut envelopes = Vec::new();
    while !buf.is_empty() {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(RpcError::invalid_argument("truncated envelope header"));
        }
        let flags = buf[0];
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let rest = &buf[ENVELOPE_HEADER_LEN..];
        if rest.len() < len {
            return Err(RpcError::invalid_argument("truncated envelope payload"));
        }
        envelopes.push((flags, &rest[..len]));
        buf = &rest[len..];
    }
    Ok(envelopes)
}

/// Decode the single request message of a server-streaming call.
pub fn decode_stream_request<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, RpcError> {
    let envelopes = decode_envelopes(body)?;
    match envelopes.as_slice() {
        [] => Ok(T::default()),
        [(flags, payload)] => {
            if flags & FLAG_COMPRESSED != 0 {
                return Err(RpcError::new(
                    Code::Unimplemented,
                    "compressed request messages are not supported",
                ));
            }
            decode_unary(payload)
        }
        _ => Err(RpcError::invalid_argument(
            "server-streaming call expects exactly one request message",
        )),
    }
}

/// Frame `payload` as one envelope.
pub fn encode_envelope(flags: u8, payload: &[u8]) -> Bytes {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}

/// Frame one streamed message.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes, serde_json::Error> {
    let payload = serde_json::to_vec(message)?;
    Ok(encode_envelope(0, &payload))
}

/// Final envelope of a stream, carrying `error` if the call failed.
pub fn end_stream(error: Option<&RpcError>) -> Bytes {
    let payload = match error {
        Some(err) => json!({ "error": err.body() }),
        None => json!({}),
    };
    encode_envelope(FLAG_END_STREAM, payload.to_string().as_bytes())
}
