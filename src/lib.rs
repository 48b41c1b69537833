//! Feature flag evaluation service.
//!
//! Exposes a flag evaluation engine over the Connect protocol (HTTP/1.1, h2c
//! or TLS, on TCP or a Unix socket), streams change notifications to
//! subscribers, and serves probes and Prometheus metrics on a management port.

pub mod admin;
pub mod config;
pub mod error;
pub mod eval;
pub mod eventing;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod service;
pub mod store;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use eval::Evaluator;
pub use eventing::{Notification, NotificationBus};
pub use http::FlagService;
pub use lifecycle::Shutdown;
pub use store::FlagStore;
