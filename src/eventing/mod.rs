//! Event streaming subsystem.
//!
//! # Data Flow
//! ```text
//! flag reload (store/watcher.rs)
//!     → NotificationBus::publish
//!     → one mailbox per open stream
//!     → stream task (provider_ready, keep_alive, forwarded notifications)
//!     → EventStream response body
//! ```

pub mod bus;
pub mod notification;

pub use bus::{NotificationBus, Subscription, SubscriptionId};
pub use notification::{Notification, NotificationType};
