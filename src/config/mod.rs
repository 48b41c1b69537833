//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (main.rs)
//!     → ServiceConfig (validated, immutable)
//!     → shared by value with the bootstrap, bus and recorder
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; flag definitions reload, config does not
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    FlagSourceConfig, ObservabilityConfig, ServerConfig, ServiceConfig, StreamingConfig,
};
pub use validation::{validate_config, ValidationError};
