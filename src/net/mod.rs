//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → listener.rs (Unix socket if configured, else TCP on all interfaces)
//!     → tls.rs (optional: rustls config from PEM files)
//!     → connection.rs (per connection: TLS handshake, then h1 or h2)
//! ```
//!
//! # Design Decisions
//! - A socket path wins over the port
//! - TLS is enabled only when both certificate and key are configured, and
//!   applies to whichever listener was bound

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{serve_connections, ConnectionSettings};
pub use listener::{bind, BoundListener, ListenerError};
pub use tls::load_tls_config;
