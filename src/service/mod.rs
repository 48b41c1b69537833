//! Flag evaluation RPC service.
//!
//! # Data Flow
//! ```text
//! POST /schema.v1.Service/<Method>
//!     → handlers.rs (decode request)
//!     → resolve.rs (request id, span, evaluator call, impression)
//!     → errors.rs (domain code → rpc code)
//!     → connect.rs (JSON body or envelope stream)
//! ```
//!
//! # Design Decisions
//! - The Connect protocol is spoken with JSON codecs; every method is a POST
//! - One generic dispatcher serves all typed resolutions
//! - Event streams are driven by the notification bus, one task per stream

pub mod connect;
pub mod errors;
pub mod handlers;
pub mod messages;
pub mod resolve;

use axum::routing::post;
use axum::Router;

pub use connect::{Code, RpcError};
pub use errors::{map_error, ERROR_PREFIX};
pub use handlers::RpcState;
pub use resolve::{resolve, ResponseSetter};

/// Fully-qualified service name.
pub const SERVICE_NAME: &str = "schema.v1.Service";

/// Path of one method of the service.
pub fn method_path(method: &str) -> String {
    format!("/{SERVICE_NAME}/{method}")
}

/// Router with every RPC method of the service.
pub fn router(state: RpcState) -> Router {
    Router::new()
        .route(&method_path("ResolveBoolean"), post(handlers::resolve_boolean))
        .route(&method_path("ResolveString"), post(handlers::resolve_string))
        .route(&method_path("ResolveInt"), post(handlers::resolve_int))
        .route(&method_path("ResolveFloat"), post(handlers::resolve_float))
        .route(&method_path("ResolveObject"), post(handlers::resolve_object))
        .route(&method_path("ResolveAll"), post(handlers::resolve_all))
        .route(&method_path("EventStream"), post(handlers::event_stream))
        .with_state(state)
}
