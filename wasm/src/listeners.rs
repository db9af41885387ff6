// WASM event listener lifecycle
//
// Browser callbacks are Rust closures handed to `addEventListener`. Each one is
// kept alive in a `ManagedListener` and removed again when it is dropped, so
// nothing leaks through `Closure::forget`.

use parking_lot::RwLock;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget};

/// One registered event listener.
pub struct ManagedListener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl ManagedListener {
    /// Attach `callback` to `event` on `target`.
    pub fn attach<F>(target: &EventTarget, event: &'static str, callback: F) -> Result<Self, String>
    where
        F: FnMut(Event) + 'static,
    {
        let callback = Closure::wrap(Box::new(callback) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
            .map_err(|e| format!("Failed to add {} listener: {:?}", event, e))?;

        Ok(Self {
            target: target.clone(),
            event,
            callback,
        })
    }

    pub fn event(&self) -> &'static str {
        self.event
    }
}

impl Drop for ManagedListener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}

/// Listeners that live as long as their owner.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<ManagedListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach and keep a listener.
    pub fn attach<F>(&self, target: &EventTarget, event: &'static str, callback: F) -> Result<(), String>
    where
        F: FnMut(Event) + 'static,
    {
        let listener = ManagedListener::attach(target, event, callback)?;
        tracing::debug!("listening for {}", listener.event());
        self.listeners.write().push(listener);
        Ok(())
    }

    /// Detach every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn fire(target: &EventTarget, name: &str) {
        let event = Event::new(name).unwrap();
        target.dispatch_event(&event).unwrap();
    }

    #[wasm_bindgen_test]
    fn test_len_tracks_attached_listeners() {
        let target = EventTarget::new().unwrap();
        let set = ListenerSet::new();
        assert!(set.is_empty());

        set.attach(&target, "ping", |_| {}).unwrap();
        set.attach(&target, "pong", |_| {}).unwrap();
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
    }

    #[wasm_bindgen_test]
    fn test_dropped_listener_stops_firing() {
        let target = EventTarget::new().unwrap();
        let hits = Rc::new(Cell::new(0));

        let counter = Rc::clone(&hits);
        let listener = ManagedListener::attach(&target, "ping", move |_| {
            counter.set(counter.get() + 1);
        })
        .unwrap();
        fire(&target, "ping");
        assert_eq!(hits.get(), 1);

        drop(listener);
        fire(&target, "ping");
        assert_eq!(hits.get(), 1);
    }
}
