//! Generic synchronous event hooks, independent of the message bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// A listener invoked synchronously by [`EventHooks::emit`].
pub type EventListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Named event registry: `on(event, listener)` / `emit(event, payload)`.
#[derive(Default)]
pub struct EventHooks {
    listeners: RwLock<HashMap<String, Vec<EventListener>>>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Invoke every listener for `event` in registration order.
    ///
    /// Returns the number of listeners invoked. Listeners are cloned out of
    /// the registry first, so a listener may register further listeners.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let listeners: Vec<EventListener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<String> = self
            .listeners
            .read()
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EventHooks").field("events", &events).finish()
    }
}
