//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, ports valid and distinct)
//! - Detect incomplete transport options
//!
//! Returns every validation error, not just the first.

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be non-zero")]
    Zero { field: &'static str },

    #[error("server.port and server.management_port must differ (both {0})")]
    PortClash(u16),

    #[error("server.cert_path and server.key_path must be set together")]
    PartialTls,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.socket_path.is_none() && server.port == 0 {
        errors.push(ValidationError::Zero { field: "server.port" });
    }
    if server.management_port == 0 {
        errors.push(ValidationError::Zero {
            field: "server.management_port",
        });
    }
    if server.socket_path.is_none() && server.port != 0 && server.port == server.management_port {
        errors.push(ValidationError::PortClash(server.port));
    }

    if server.cert_path.is_some() != server.key_path.is_some() {
        errors.push(ValidationError::PartialTls);
    }

    if config.streaming.keep_alive_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "streaming.keep_alive_secs",
        });
    }
    if config.streaming.frame_buffer == 0 {
        errors.push(ValidationError::Zero {
            field: "streaming.frame_buffer",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
