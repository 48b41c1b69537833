//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, per-call spans)
//!     → metrics.rs (histograms, gauge, impressions counter)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → GET /metrics on the management port (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Correlation id flows through every resolution as a span field
//! - Metrics are cheap (atomic updates behind the global recorder)

pub mod logging;
pub mod metrics;

pub use metrics::MetricsRecorder;
