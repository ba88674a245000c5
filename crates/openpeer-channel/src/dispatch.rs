//! Event dispatch over per-type listener lists.
//!
//! Types are matched literally. `"*"` is the default type, not a wildcard:
//! a listener on `"*"` only hears events pushed with type `"*"`.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Callback invoked with the payload of each matching event.
///
/// Listeners are compared by identity, so keep a clone of the `Arc` to
/// remove one later.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Listener lists keyed by event type, each in insertion order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `kind`.
    pub fn add(&self, kind: &str, listener: Listener) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.entry(kind.to_string()).or_default().push(listener);
    }

    /// Remove the first registration of this exact listener from `kind`.
    pub fn remove(&self, kind: &str, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = listeners.get_mut(kind) else {
            return false;
        };
        match list.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every listener for `kind`.
    pub fn clear_kind(&self, kind: &str) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.remove(kind);
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.clear();
    }

    /// Number of listeners registered for `kind`.
    pub fn count(&self, kind: &str) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(kind).map_or(0, Vec::len)
    }

    /// Invoke every listener for `kind`, in order. Returns how many ran.
    ///
    /// Works on a snapshot taken before the first call, so listeners may add
    /// or remove listeners without deadlocking; such changes apply from the
    /// next event on.
    pub fn dispatch(&self, kind: &str, data: &Value) -> usize {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.get(kind).cloned().unwrap_or_default()
        };
        for l in &snapshot {
            l(data);
        }
        snapshot.len()
    }
}
