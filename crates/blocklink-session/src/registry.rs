use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use blocklink_frame::DeviceRecord;
use tracing::warn;

/// Callback invoked for every device record the bridge observes.
pub type Listener = Arc<dyn Fn(DeviceRecord) + Send + Sync>;

/// Ordered, append-only set of listeners.
///
/// Listeners are never removed or deduplicated; registering the same callback
/// twice makes it fire twice.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Listener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with `listeners`, in order.
    pub fn with_listeners(listeners: impl IntoIterator<Item = Listener>) -> Self {
        Self {
            listeners: RwLock::new(listeners.into_iter().collect()),
        }
    }

    /// Append a listener.
    pub fn register<F>(&self, listener: F)
    where
        F: Fn(DeviceRecord) + Send + Sync + 'static,
    {
        self.register_shared(Arc::new(listener));
    }

    /// Append an already shared listener.
    pub fn register_shared(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `record` to every listener, each on its own thread.
    ///
    /// Returns immediately without waiting for any listener. A listener that
    /// panics only takes down its own thread. Returns the number of listener
    /// threads started.
    pub fn dispatch(&self, record: &DeviceRecord) -> usize {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut started = 0usize;
        for listener in listeners {
            let record = record.clone();
            let spawned = thread::Builder::new()
                .name("blocklink-listener".to_string())
                .spawn(move || listener(record));
            match spawned {
                Ok(_) => started += 1,
                Err(err) => warn!(error = %err, "failed to start listener thread"),
            }
        }
        started
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
