//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the flag service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener, TLS and CORS settings.
    pub server: ServerConfig,

    /// Event stream settings.
    pub streaming: StreamingConfig,

    /// Flag definition source.
    pub flags: FlagSourceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port for the RPC service.
    pub port: u16,

    /// TCP port for health probes and metrics.
    pub management_port: u16,

    /// Certificate file (PEM). TLS is enabled only when the key is set too.
    pub cert_path: Option<PathBuf>,

    /// Private key file (PEM).
    pub key_path: Option<PathBuf>,

    /// Unix socket path. Takes precedence over `port` when set.
    pub socket_path: Option<PathBuf>,

    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// Upper bound on the graceful drain after shutdown is requested.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8013,
            management_port: 8014,
            cert_path: None,
            key_path: None,
            socket_path: None,
            cors_origins: Vec::new(),
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Certificate and key, when both are configured.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Event stream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Interval between keep-alive frames on every stream.
    pub keep_alive_secs: u64,

    /// How long a publish waits on one full subscriber mailbox before
    /// dropping the notification for that subscriber.
    pub publish_timeout_ms: u64,

    /// Frames buffered between a stream task and the response body.
    pub frame_buffer: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 20,
            publish_timeout_ms: 1000,
            frame_buffer: 16,
        }
    }
}

impl StreamingConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Flag definition source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlagSourceConfig {
    /// JSON flag definition file.
    pub path: Option<PathBuf>,

    /// Reload and notify subscribers when the file changes.
    pub watch: bool,
}

impl Default for FlagSourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            watch: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name attached to every metric and used as the metrics scope.
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "flag-service".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}
