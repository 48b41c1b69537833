//! Per-connection HTTP serving.
//!
//! # Responsibilities
//! - Accept connections from any listener (TCP or Unix socket)
//! - Terminate TLS first when a rustls configuration is supplied
//! - Serve HTTP/1.1 and HTTP/2 (h2c prior knowledge, or ALPN over TLS)
//! - Bound how long a client may take to send its request headers
//! - Close connections gracefully on shutdown and wait for them to drain

use std::time::Duration;

use axum::serve::Listener;
use axum::Router;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;

use crate::lifecycle::ShutdownSignal;

/// How connections accepted on one listener are served.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Time allowed between accepting a connection and a complete request
    /// head. Also bounds the TLS handshake.
    pub header_read_timeout: Duration,
    pub tls: Option<RustlsConfig>,
}

impl ConnectionSettings {
    pub fn cleartext(header_read_timeout: Duration) -> Self {
        Self {
            header_read_timeout,
            tls: None,
        }
    }
}

/// Accept and serve connections until `shutdown` fires, then wait for open
/// connections to finish their in-flight requests.
pub async fn serve_connections<L>(
    mut listener: L,
    app: Router,
    settings: ConnectionSettings,
    mut shutdown: ShutdownSignal,
) where
    L: Listener,
{
    let acceptor = settings
        .tls
        .map(|config| RustlsAcceptor::new(config).handshake_timeout(settings.header_read_timeout));
    let timeout = settings.header_read_timeout;
    let mut connections = JoinSet::new();

    loop {
        let (io, _) = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.recv() => break,
        };
        while connections.try_join_next().is_some() {}

        let app = app.clone();
        let acceptor = acceptor.clone();
        let signal = shutdown.clone();
        connections.spawn(async move {
            match acceptor {
                None => serve_connection(io, app, timeout, signal).await,
                Some(acceptor) => match acceptor.accept(io, ()).await {
                    Ok((stream, ())) => serve_connection(stream, app, timeout, signal).await,
                    Err(e) => tracing::debug!(error = %e, "TLS handshake failed"),
                },
            }
        });
    }

    tracing::debug!(open = connections.len(), "Listener closed, draining connections");
    while connections.join_next().await.is_some() {}
}

async fn serve_connection<I>(
    io: I,
    app: Router,
    header_read_timeout: Duration,
    mut shutdown: ShutdownSignal,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let conn =
        builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(app));
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "Connection closed with error");
            }
            return;
        }
        _ = shutdown.recv() => {}
    }

    conn.as_mut().graceful_shutdown();
    if let Err(e) = conn.await {
        tracing::debug!(error = %e, "Connection closed with error during drain");
    }
}
