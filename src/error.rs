//! Service-level errors.

use std::io;
use std::time::Duration;

use metrics_exporter_prometheus::BuildError;

use crate::net::ListenerError;

/// Fatal errors of the transport bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] ListenerError),

    #[error("failed to load TLS configuration: {0}")]
    Tls(#[source] io::Error),

    #[error("failed to build metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("RPC server failed: {0}")]
    Serve(#[source] io::Error),

    #[error("management server failed: {0}")]
    Admin(#[source] io::Error),

    #[error("connections did not drain within {0:?}")]
    ShutdownTimeout(Duration),
}
