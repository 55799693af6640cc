//! Concurrent listener registry shared by the broadcaster and the change
//! notifier.
//!
//! Each listener owns a bounded queue drained by its own task, so `publish`
//! never waits on listener code. When a listener's queue is full the item is
//! dropped for that listener only. A listener that panics is logged and keeps
//! receiving; a listener whose task is gone is pruned on the next publish.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Items buffered per listener before new ones are dropped
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

type Senders<T> = Arc<DashMap<u64, mpsc::Sender<T>>>;

/// Handle returned by a registration.
///
/// Dropping the handle does not unregister; call [`Registration::cancel`].
/// Cancelling is idempotent and safe while a publish is in progress.
pub struct Registration {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Registration {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn cancel(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_none()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub struct ListenerSet<T> {
    name: &'static str,
    capacity: usize,
    next_id: AtomicU64,
    senders: Senders<T>,
}

impl<T: Clone + Send + 'static> ListenerSet<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, DEFAULT_LISTENER_CAPACITY)
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            senders: Arc::new(DashMap::new()),
        }
    }

    /// Register a callback run on its own task for every published item
    pub fn register<F>(&self, listener: F) -> Registration
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (registration, mut rx) = self.register_channel();
        let name = self.name;

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(|| listener(item))).is_err() {
                    warn!("[{}] Listener panicked, continuing delivery", name);
                }
            }
        });

        registration
    }

    /// Register a raw receiver; the listener is pruned once it is dropped
    pub fn register_channel(&self) -> (Registration, mpsc::Receiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(id, tx);
        debug!("[{}] Registered listener {}", self.name, id);

        let senders = Arc::clone(&self.senders);
        let name = self.name;
        let registration = Registration::new(move || {
            if senders.remove(&id).is_some() {
                debug!("[{}] Unregistered listener {}", name, id);
            }
        });

        (registration, rx)
    }

    /// Queue `item` for every listener, returning how many accepted it
    pub fn publish(&self, item: T) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for listener in self.senders.iter() {
            match listener.value().try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("[{}] Listener {} is full, dropping item", self.name, listener.key());
                }
                Err(TrySendError::Closed(_)) => dead.push(*listener.key()),
            }
        }

        // Removing while iterating would deadlock the shard
        for id in dead {
            self.senders.remove(&id);
            debug!("[{}] Pruned closed listener {}", self.name, id);
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
