//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → servers stop accepting → streams close → drain bounded by grace
//! ```
//!
//! # Design Decisions
//! - One watch channel reaches every long-running task, including tasks that
//!   subscribe after the trigger
//! - Shutdown has a deadline: the drain is abandoned after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
