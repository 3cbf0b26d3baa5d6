//! Observer registry for wallet update events.
//!
//! Listeners are plain callbacks registered globally or for a single wallet.
//! Every registration returns a [`Subscription`] handle that removes exactly
//! that listener. A broadcast channel is kept alongside the callbacks for
//! transports that prefer to pull events.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use tokio::sync::broadcast;

use super::wallet_event::WalletUpdated;
use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;

type Listener = Arc<dyn Fn(&WalletUpdated) + Send + Sync>;

struct Registered {
    id: u64,
    listener: Listener,
}

struct EventBusInner {
    listeners: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<WalletUpdated>,
}

impl EventBusInner {
    /// Lock the listener list, recovering from poison if necessary.
    ///
    /// Listeners run outside the lock, so a poisoned list is still intact.
    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Registered>> {
        self.listeners.lock().unwrap_or_else(|poisoned| {
            warn!("Event bus listener mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }
}

/// Fan-out bus for [`WalletUpdated`] events.
///
/// Cheap to clone; clones share listeners. Emitting never blocks on slow
/// consumers and never fails: a panicking listener is logged and skipped.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how far a channel receiver may lag before it starts
    /// missing events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(EventBusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                sender,
            }),
        }
    }

    /// Registers a listener for every wallet.
    pub fn on_wallet_updated<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WalletUpdated) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_listeners().push(Registered {
            id,
            listener: Arc::new(listener),
        });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a listener that only sees events for `wallet`.
    pub fn on_wallet_updated_for_wallet<F>(
        &self,
        wallet: impl Into<String>,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&WalletUpdated) + Send + Sync + 'static,
    {
        let wallet = wallet.into();
        self.on_wallet_updated(move |event| {
            if event.wallet == wallet {
                listener(event);
            }
        })
    }

    /// Receiver-based subscription for transports.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<WalletUpdated> {
        self.inner.sender.subscribe()
    }

    /// Delivers an event to every listener and channel receiver.
    pub fn emit(&self, event: WalletUpdated) {
        // Snapshot so listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .inner
            .lock_listeners()
            .iter()
            .map(|r| r.listener.clone())
            .collect();

        debug!(
            "Emitting {:?} for {} to {} listener(s)",
            event.reason,
            event.wallet,
            listeners.len()
        );

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!("Wallet update listener panicked for {}", event.wallet);
            }
        }

        // No receivers is fine; lagging receivers drop old events.
        let _ = self.inner.sender.send(event);
    }

    /// Number of registered callback listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock_listeners().len()
    }

    /// Removes every callback listener. Returns how many were removed.
    pub fn remove_all_listeners(&self) -> usize {
        let mut listeners = self.inner.lock_listeners();
        let count = listeners.len();
        listeners.clear();
        count
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registered listener.
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "dropping a Subscription leaves the listener registered forever"]
pub struct Subscription {
    id: u64,
    bus: Weak<EventBusInner>,
}

impl Subscription {
    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .map(|bus| bus.lock_listeners().iter().any(|r| r.id == self.id))
            .unwrap_or(false)
    }
}
