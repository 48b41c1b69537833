//! Notification bus and per-stream keep-alive driver.
//!
//! # Data Flow
//! ```text
//! publish(notification)
//!     → snapshot of subscriber mailboxes (read lock released before sending)
//!     → concurrent bounded sends, one per mailbox
//!         ├─ delivered
//!         ├─ mailbox full past publish_timeout → dropped for that subscriber
//!         └─ mailbox closed → ignored
//!
//! stream task (one per open event stream)
//!     → provider_ready
//!     → loop: keep_alive tick | mailbox | client gone | shutdown
//!     → frames channel → response body
//! ```
//!
//! # Design Decisions
//! - Mailboxes hold one notification; a slow subscriber cannot stall publishers
//!   for longer than `publish_timeout`
//! - Registration happens before the stream task starts, so a stream never
//!   misses a notification published after it was opened
//! - A [`Subscription`] unregisters itself on drop, so every way a stream ends
//!   (disconnect, shutdown, cancellation) removes the mailbox

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::notification::Notification;
use crate::config::StreamingConfig;
use crate::lifecycle::ShutdownSignal;

/// Notifications buffered per subscriber.
const MAILBOX_CAPACITY: usize = 1;

/// Identifies one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Mailboxes = HashMap<SubscriptionId, mpsc::Sender<Notification>>;

#[derive(Debug, Default)]
struct Registry {
    mailboxes: RwLock<Mailboxes>,
}

impl Registry {
    fn insert(&self, id: SubscriptionId, mailbox: mpsc::Sender<Notification>) {
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, mailbox);
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, mpsc::Sender<Notification>)> {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, mailbox)| (*id, mailbox.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A registered mailbox. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    mailbox: mpsc::Receiver<Notification>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next notification, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.mailbox.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Notification, TryRecvError> {
        self.mailbox.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!(subscription = %self.id, "Unsubscribed");
        }
    }
}

/// Registry of event stream subscribers.
#[derive(Debug)]
pub struct NotificationBus {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    published: AtomicU64,
    keep_alive: Duration,
    publish_timeout: Duration,
}

impl NotificationBus {
    pub fn new(config: &StreamingConfig) -> Self {
        Self::with_timing(config.keep_alive(), config.publish_timeout())
    }

    pub fn with_timing(keep_alive: Duration, publish_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            keep_alive,
            publish_timeout,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Register a new mailbox.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.registry.insert(id, tx);
        debug!(subscription = %id, "Subscribed");

        Subscription {
            id,
            mailbox: rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Remove a mailbox. Its subscription sees the end of its notifications.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Total notifications published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliver `notification` to every current subscriber.
    ///
    /// Returns how many mailboxes accepted it. Subscribers whose mailbox stays
    /// full for `publish_timeout` miss this notification.
    pub async fn publish(&self, notification: Notification) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let targets = self.registry.snapshot();
        let timeout = self.publish_timeout;

        let sends = targets.into_iter().map(|(id, mailbox)| {
            let notification = notification.clone();
            async move {
                match mailbox.send_timeout(notification, timeout).await {
                    Ok(()) => true,
                    Err(SendTimeoutError::Timeout(dropped)) => {
                        warn!(
                            subscription = %id,
                            kind = dropped.kind.as_str(),
                            "Subscriber mailbox full, dropping notification"
                        );
                        false
                    }
                    Err(SendTimeoutError::Closed(_)) => false,
                }
            }
        });

        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }

    /// Open an event stream feeding `frames`.
    ///
    /// The subscription is registered before this returns. The spawned task
    /// emits `provider_ready`, then forwards published notifications and a
    /// keep-alive every `keep_alive`, until `frames` closes, shutdown is
    /// signalled or the subscription is removed.
    pub fn spawn_stream(
        &self,
        frames: mpsc::Sender<Notification>,
        shutdown: ShutdownSignal,
    ) -> (SubscriptionId, JoinHandle<()>) {
        let subscription = self.subscribe();
        let id = subscription.id();
        let task = tokio::spawn(run_stream(subscription, frames, shutdown, self.keep_alive));
        (id, task)
    }
}

async fn run_stream(
    mut subscription: Subscription,
    frames: mpsc::Sender<Notification>,
    mut shutdown: ShutdownSignal,
    keep_alive: Duration,
) {
    let id = subscription.id();

    if frames.send(Notification::provider_ready()).await.is_err() {
        debug!(subscription = %id, "Stream closed before provider_ready");
        return;
    }

    let mut ticker = interval_at(Instant::now() + keep_alive, keep_alive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let next = tokio::select! {
            _ = ticker.tick() => Notification::keep_alive(),
            received = subscription.recv() => match received {
                Some(notification) => notification,
                None => {
                    debug!(subscription = %id, "Subscription removed");
                    break;
                }
            },
            _ = frames.closed() => {
                debug!(subscription = %id, "Client disconnected");
                break;
            }
            _ = shutdown.recv() => {
                info!(subscription = %id, "Closing event stream for shutdown");
                break;
            }
        };

        if !forward(&frames, next, keep_alive, id).await {
            debug!(subscription = %id, "Frame channel closed");
            break;
        }
    }
}

/// Send one frame, waiting at most `wait`. Returns false once the stream is gone.
async fn forward(
    frames: &mpsc::Sender<Notification>,
    notification: Notification,
    wait: Duration,
    id: SubscriptionId,
) -> bool {
    match frames.send_timeout(notification, wait).await {
        Ok(()) => true,
        Err(SendTimeoutError::Timeout(dropped)) => {
            warn!(
                subscription = %id,
                kind = dropped.kind.as_str(),
                "Client not reading, frame dropped"
            );
            true
        }
        Err(SendTimeoutError::Closed(_)) => false,
    }
}
