//! Event subscription bus.
//!
//! Unsolicited simulator events are fanned out to listeners registered by
//! event name.  The bus is independent of the command correlation table:
//! an event nobody asked for is still delivered to its subscribers.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌─────────────┐
//! │ engine      │────▶│  name → [listener…]  │────▶│ callbacks   │
//! │ (inbound)   │     │  (registration order)│     │ (user code) │
//! └─────────────┘     └──────────────────────┘     └─────────────┘
//! ```
//!
//! Listeners are invoked with no bus borrow held, so a callback may
//! subscribe or unsubscribe freely.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::debug;

use crate::rpc::message::EventMessage;

/// Callback invoked for every matching event.
pub type Listener = Rc<dyn Fn(&EventMessage)>;

/// Options for [`EventBus::listen`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Remove the listener before its first invocation.
    pub once: bool,
}

impl ListenOptions {
    pub const ONCE: Self = Self { once: true };
}

struct ListenerEntry {
    id: u64,
    once: bool,
    callback: Listener,
}

/// Event name → ordered listener list.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: HashMap<String, Vec<ListenerEntry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event` and return its handle.
    pub fn listen(
        bus: &Rc<RefCell<Self>>,
        event: &str,
        callback: impl Fn(&EventMessage) + 'static,
        options: ListenOptions,
    ) -> Subscription {
        let mut this = bus.borrow_mut();
        let id = this.next_id;
        this.next_id += 1;
        this.listeners
            .entry(event.to_owned())
            .or_default()
            .push(ListenerEntry {
                id,
                once: options.once,
                callback: Rc::new(callback),
            });

        Subscription {
            bus: Rc::downgrade(bus),
            event: event.to_owned(),
            id,
        }
    }

    /// Deliver `message` to every listener of its event name.
    ///
    /// One-shot listeners are removed before any callback runs.  Returns
    /// the number of listeners invoked.
    pub fn dispatch(bus: &Rc<RefCell<Self>>, message: &EventMessage) -> usize {
        let targets = bus.borrow_mut().take_targets(&message.event);
        for callback in &targets {
            callback(message);
        }
        if targets.is_empty() {
            debug!("EVT: no listeners for {}", message.event);
        }
        targets.len()
    }

    fn take_targets(&mut self, event: &str) -> Vec<Listener> {
        let Some(entries) = self.listeners.get_mut(event) else {
            return Vec::new();
        };
        let targets = entries.iter().map(|e| Rc::clone(&e.callback)).collect();
        entries.retain(|e| !e.once);
        if entries.is_empty() {
            self.listeners.remove(event);
        }
        targets
    }

    fn remove(&mut self, event: &str, id: u64) -> bool {
        let Some(entries) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

/// Handle to one registered listener.
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[must_use = "the listener stays registered until `unsubscribe` is called"]
pub struct Subscription {
    bus: Weak<RefCell<EventBus>>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the listener.  Returns `false` if it was already gone
    /// (one-shot listener that fired, or the bus was dropped).
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.borrow_mut().remove(&self.event, self.id))
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
