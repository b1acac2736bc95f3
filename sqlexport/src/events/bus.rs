use std::sync::{Arc, Mutex};

use crate::types::{EventType, ExportEvent};

/// A listener invoked for each published event it subscribed to.
pub type EventListener = Box<dyn Fn(&ExportEvent) + Send>;

struct RegisteredListener {
    /// The event type this listener subscribed to, or none for the whole catalog.
    event_type: Option<EventType>,
    listener: EventListener,
}

struct Inner {
    listeners: Vec<RegisteredListener>,
}

/// In-process publish/subscribe bus for [`ExportEvent`]s.
///
/// Dispatch is synchronous: [`EventBus::emit`] invokes every matching listener in
/// registration order before returning, so listeners observe events in exactly the
/// order the engine produced them. The bus is a cheap to clone handle over shared
/// state.
///
/// Listeners must not call back into the bus they were registered on.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                listeners: Vec::new(),
            })),
        }
    }

    /// Registers a listener for a single event type.
    pub fn on<F>(&self, event_type: EventType, listener: F)
    where
        F: Fn(&ExportEvent) + Send + 'static,
    {
        self.register(Some(event_type), Box::new(listener));
    }

    /// Registers a listener for every event type.
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&ExportEvent) + Send + 'static,
    {
        self.register(None, Box::new(listener));
    }

    /// Publishes an event to all matching listeners.
    pub fn emit(&self, event: ExportEvent) {
        let event_type = event.event_type();

        let inner = lock_inner(&self.inner);
        for registered in inner.listeners.iter() {
            match registered.event_type {
                Some(subscribed) if subscribed != event_type => {}
                _ => (registered.listener)(&event),
            }
        }
    }

    fn register(&self, event_type: Option<EventType>, listener: EventListener) {
        let mut inner = lock_inner(&self.inner);
        inner.listeners.push(RegisteredListener {
            event_type,
            listener,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
