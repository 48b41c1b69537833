//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS/Unix connection
//!     → server.rs (listener, protocol selection, lifecycle)
//!     → TraceLayer
//!     → cors.rs (preflight, exposed protocol headers)
//!     → middleware/metrics.rs (in-flight, duration, size)
//!     → service router (RPC handlers)
//! ```

pub mod cors;
pub mod middleware;
pub mod server;

pub use server::FlagService;
