//! Pub/sub for bridge events.
//!
//! Each listener runs in isolation: a panicking listener is caught, logged
//! and skipped, and delivery continues with the rest.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
}

#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Arc<Mutex<Registry>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = registry.listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.listeners.remove(event);
        }
        removed
    }

    /// Returns how many listeners completed without panicking.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        // Snapshot so listeners may call on/off without deadlocking.
        let listeners: Vec<Listener> = {
            let registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            match registry.listeners.get(event) {
                Some(list) => list.iter().map(|(_, l)| l.clone()).collect(),
                None => return 0,
            }
        };
        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(data))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(event, "event listener panicked"),
            }
        }
        delivered
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        registry.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn clear(&self) {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        registry.listeners.clear();
    }
}
