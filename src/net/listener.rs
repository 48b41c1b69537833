//! RPC listener binding.
//!
//! # Responsibilities
//! - Bind a Unix domain socket when a socket path is configured
//! - Otherwise bind TCP on all interfaces at the configured port
//! - Describe the bound address for logs

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::config::ServerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind a TCP port.
    BindTcp(SocketAddr, std::io::Error),
    /// Failed to bind a Unix socket.
    BindUnix(PathBuf, std::io::Error),
    /// Unix sockets are not available on this platform.
    UnixUnsupported(PathBuf),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::BindTcp(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ListenerError::BindUnix(path, e) => {
                write!(f, "Failed to bind socket {}: {}", path.display(), e)
            }
            ListenerError::UnixUnsupported(path) => write!(
                f,
                "Unix sockets are not supported on this platform: {}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::BindTcp(_, e) | ListenerError::BindUnix(_, e) => Some(e),
            ListenerError::UnixUnsupported(_) => None,
        }
    }
}

/// The bound RPC listener.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl BoundListener {
    /// Human-readable local address.
    pub fn describe(&self) -> String {
        match self {
            BoundListener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => "tcp".to_string(),
            },
            #[cfg(unix)]
            BoundListener::Unix(_, path) => format!("unix:{}", path.display()),
        }
    }
}

/// Bind the RPC listener. A configured socket path takes precedence over the port.
pub async fn bind(config: &ServerConfig) -> Result<BoundListener, ListenerError> {
    let listener = match &config.socket_path {
        Some(path) => bind_unix(path)?,
        None => {
            let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| ListenerError::BindTcp(addr, e))?;
            BoundListener::Tcp(listener)
        }
    };

    tracing::info!(address = %listener.describe(), "Listener bound");
    Ok(listener)
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<BoundListener, ListenerError> {
    let listener =
        UnixListener::bind(path).map_err(|e| ListenerError::BindUnix(path.to_path_buf(), e))?;
    Ok(BoundListener::Unix(listener, path.to_path_buf()))
}

#[cfg(not(unix))]
fn bind_unix(path: &Path) -> Result<BoundListener, ListenerError> {
    Err(ListenerError::UnixUnsupported(path.to_path_buf()))
}
