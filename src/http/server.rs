//! Transport bootstrap.
//!
//! # Responsibilities
//! - Bind the RPC listener (Unix socket or TCP) and load TLS material
//! - Build the RPC router with tracing, metrics and CORS layers
//! - Install the Prometheus exporter and run the management server
//! - Serve TLS, or cleartext HTTP/1.1 and h2c (prior knowledge), on either
//!   listener kind
//! - Race external shutdown against fatal errors of either server
//!
//! # Data Flow
//! ```text
//! serve()
//!     → bind listener, load TLS
//!     → spawn RPC server ──────────────┐
//!     → spawn management server ───────┤
//!     → select:                        ▼
//!         RPC server exits     → trigger drain, return its result
//!         management exits     → trigger drain, return ServiceError::Admin
//!         shutdown requested   → trigger drain (servers + streams),
//!                                await RPC server within shutdown_grace
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;

use crate::admin::{self, AdminState, ReadinessProbe};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::eval::Evaluator;
use crate::eventing::NotificationBus;
use crate::http::cors::cors_layer;
use crate::http::middleware::{metrics_middleware, MetricsState};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{self, load_tls_config, serve_connections, BoundListener, ConnectionSettings};
use crate::observability::metrics::install_exporter;
use crate::observability::MetricsRecorder;
use crate::service::{self, RpcState};

/// Time an RPC client has to send its request head.
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The flag evaluation service: RPC listener plus management server.
pub struct FlagService {
    config: ServiceConfig,
    bus: Arc<NotificationBus>,
}

impl FlagService {
    pub fn new(config: ServiceConfig) -> Self {
        let bus = Arc::new(NotificationBus::new(&config.streaming));
        Self { config, bus }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Bus feeding every event stream opened on this service.
    pub fn bus(&self) -> Arc<NotificationBus> {
        Arc::clone(&self.bus)
    }

    /// RPC routes wrapped in tracing, CORS and request metrics.
    pub fn build_router(
        &self,
        evaluator: Arc<dyn Evaluator>,
        recorder: Arc<MetricsRecorder>,
        shutdown: Shutdown,
    ) -> Router {
        let state = RpcState {
            evaluator,
            metrics: Arc::clone(&recorder),
            bus: Arc::clone(&self.bus),
            shutdown,
            frame_buffer: self.config.streaming.frame_buffer,
        };
        let metrics_state =
            MetricsState::new(recorder, self.config.observability.service_name.clone());

        service::router(state)
            .layer(middleware::from_fn_with_state(metrics_state, metrics_middleware))
            .layer(cors_layer(&self.config.server.cors_origins))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires or either server fails.
    ///
    /// Dropping every [`Shutdown`] handle counts as a shutdown request.
    pub async fn serve(
        &self,
        evaluator: Arc<dyn Evaluator>,
        readiness: ReadinessProbe,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServiceError> {
        let server = &self.config.server;
        let exporter = install_exporter()?;
        let recorder = Arc::new(MetricsRecorder::new(
            self.config.observability.service_name.clone(),
        ));

        let listener = net::bind(server).await?;
        let tls = match server.tls_paths() {
            Some((cert, key)) => Some(load_tls_config(cert, key).await.map_err(ServiceError::Tls)?),
            None => None,
        };

        let drain = Shutdown::new();
        let app = self.build_router(evaluator, recorder, drain.clone());

        let settings = ConnectionSettings {
            header_read_timeout: HEADER_READ_TIMEOUT,
            tls,
        };
        let mut rpc = tokio::spawn(run_rpc(listener, settings, app, drain.subscribe()));
        let mut management = tokio::spawn(admin::serve(
            server.management_port,
            AdminState {
                readiness,
                exporter,
            },
            drain.subscribe(),
        ));

        tokio::select! {
            joined = &mut rpc => {
                drain.trigger();
                management.abort();
                let result = joined_result(joined);
                match &result {
                    Ok(()) => tracing::info!("RPC server stopped"),
                    Err(e) => tracing::error!(error = %e, "RPC server failed"),
                }
                return result;
            }
            joined = &mut management => {
                drain.trigger();
                rpc.abort();
                let err = match joined {
                    Ok(Ok(())) => io::Error::other("management server stopped unexpectedly"),
                    Ok(Err(e)) => e,
                    Err(e) => io::Error::other(e),
                };
                tracing::error!(error = %err, "Management server failed");
                return Err(ServiceError::Admin(err));
            }
            () = shutdown.recv() => {
                tracing::info!("Shutdown requested, draining connections");
            }
        }

        drain.trigger();
        let grace = server.shutdown_grace();
        let result = match tokio::time::timeout(grace, &mut rpc).await {
            Ok(joined) => joined_result(joined),
            Err(_) => {
                rpc.abort();
                tracing::warn!(grace = ?grace, "Drain deadline passed, dropping connections");
                Err(ServiceError::ShutdownTimeout(grace))
            }
        };
        if tokio::time::timeout(grace, &mut management).await.is_err() {
            management.abort();
        }

        tracing::info!("Shutdown complete");
        result
    }
}

fn joined_result(joined: Result<(), JoinError>) -> Result<(), ServiceError> {
    joined.map_err(|e| ServiceError::Serve(io::Error::other(e)))
}

async fn run_rpc(
    listener: BoundListener,
    settings: ConnectionSettings,
    app: Router,
    drain: ShutdownSignal,
) {
    let tls = settings.tls.is_some();
    match listener {
        BoundListener::Tcp(listener) => {
            tracing::info!(tls, "Serving HTTP/1.1 and HTTP/2");
            serve_connections(listener, app, settings, drain).await;
        }
        #[cfg(unix)]
        BoundListener::Unix(listener, path) => {
            tracing::info!(tls, path = %path.display(), "Serving HTTP/1.1 and HTTP/2 on Unix socket");
            serve_connections(listener, app, settings, drain).await;
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(error = %e, path = %path.display(), "Socket file not removed");
            }
        }
    }
}
