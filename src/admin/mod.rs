//! Management server: probes and metrics on a dedicated port.
//!
//! - `GET /healthz`: 200 while the process serves
//! - `GET /readyz`: 200 when the readiness probe passes, 412 otherwise
//! - `GET /metrics`: Prometheus exposition
//! - anything else: 404

pub mod handlers;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

use self::handlers::{healthz, not_found, readyz, render_metrics};
use crate::lifecycle::ShutdownSignal;
use crate::net::{serve_connections, ConnectionSettings};

/// Time a management client has to send its request head.
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Reports whether the service is ready for traffic.
pub type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct AdminState {
    pub readiness: ReadinessProbe,
    pub exporter: PrometheusHandle,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(render_metrics))
        .fallback(not_found)
        .with_state(state)
}

/// Bind the management port on all interfaces and serve until shutdown.
pub async fn serve(
    port: u16,
    state: AdminState,
    shutdown: ShutdownSignal,
) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Metrics and probes listening");

    serve_connections(
        listener,
        setup_admin_router(state),
        ConnectionSettings::cleartext(HEADER_READ_TIMEOUT),
        shutdown,
    )
    .await;
    tracing::debug!("Management server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::exporter_builder;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn state(ready: Arc<AtomicBool>) -> AdminState {
        AdminState {
            readiness: Arc::new(move || ready.load(Ordering::SeqCst)),
            exporter: exporter_builder().unwrap().build_recorder().handle(),
        }
    }

    async fn get_status(router: Router, path: &str) -> StatusCode {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let router = setup_admin_router(state(Arc::new(AtomicBool::new(false))));
        assert_eq!(get_status(router, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_follows_probe() {
        let ready = Arc::new(AtomicBool::new(false));
        let router = setup_admin_router(state(Arc::clone(&ready)));

        assert_eq!(
            get_status(router.clone(), "/readyz").await,
            StatusCode::PRECONDITION_FAILED
        );
        ready.store(true, Ordering::SeqCst);
        assert_eq!(get_status(router, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_renders_prometheus_text() {
        let router = setup_admin_router(state(Arc::new(AtomicBool::new(true))));
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let router = setup_admin_router(state(Arc::new(AtomicBool::new(true))));
        assert_eq!(get_status(router, "/admin/status").await, StatusCode::NOT_FOUND);
    }
}
