//! Scan-complete callback registry.
//!
//! Consumers (exporters, plot refreshers) register a zero-argument callback
//! that fires once each time a gated scan stops. Registration returns a
//! [`CallbackHandle`] used for unregistration.
//!
//! # Performance
//!
//! - Registration/unregistration: takes the write lock (rare operation)
//! - `fire()`: clones the callback list under the read lock, then invokes
//!   with no lock held, so a callback may register or unregister

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared scan-complete callback.
pub type ScanCompleteFn = Arc<dyn Fn() + Send + Sync>;

/// Handle returned when registering a callback, used for unregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

impl CallbackHandle {
    /// Get the internal ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Registry of scan-complete callbacks, fired in registration order.
pub struct ScanCompleteRegistry {
    callbacks: RwLock<Vec<(u64, ScanCompleteFn)>>,
    next_id: AtomicU64,
    fired: AtomicU64,
}

impl ScanCompleteRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fired: AtomicU64::new(0),
        }
    }

    /// Register a callback and return a handle for unregistration.
    pub fn register(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(callback_id = id, "Registering scan-complete callback");
        self.callbacks.write().push((id, Arc::new(callback)));
        CallbackHandle(id)
    }

    /// Unregister a callback. Returns `true` if it was registered.
    pub fn unregister(&self, handle: CallbackHandle) -> bool {
        let mut callbacks = self.callbacks.write();
        let initial_len = callbacks.len();
        callbacks.retain(|(id, _)| *id != handle.0);
        let removed = callbacks.len() < initial_len;

        if removed {
            tracing::debug!(callback_id = handle.0, "Unregistered scan-complete callback");
        } else {
            tracing::warn!(
                callback_id = handle.0,
                "Scan-complete callback not found for unregistration"
            );
        }
        removed
    }

    /// Invoke every callback registered when the scan completed, once.
    pub fn fire(&self) {
        let scan = self.fired.fetch_add(1, Ordering::Relaxed) + 1;
        let callbacks: Vec<ScanCompleteFn> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        tracing::info!(scan, callbacks = callbacks.len(), "Scan complete");
        for callback in callbacks {
            callback();
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// True when no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Number of times `fire()` has run.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl Default for ScanCompleteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScanCompleteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCompleteRegistry")
            .field("callbacks", &self.len())
            .field("fired", &self.fired_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_fire_unregister() {
        let registry = ScanCompleteRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&hits);
        let handle = registry.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.len(), 1);

        registry.fire();
        registry.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.fired_count(), 2);

        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        registry.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handles_are_unique() {
        let registry = ScanCompleteRegistry::new();
        let a = registry.register(|| {});
        let b = registry.register(|| {});
        assert_ne!(a, b);
        assert!(registry.unregister(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let registry = Arc::new(ScanCompleteRegistry::new());
        let hits = Arc::new(AtomicU64::new(0));
        let own_handle = Arc::new(parking_lot::Mutex::new(None::<CallbackHandle>));

        let handle = registry.register({
            let registry = Arc::clone(&registry);
            let hits = Arc::clone(&hits);
            let own_handle = Arc::clone(&own_handle);
            move || {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = own_handle.lock().take() {
                    registry.unregister(handle);
                }
                registry.register(|| {});
            }
        });
        *own_handle.lock() = Some(handle);

        registry.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        registry.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
