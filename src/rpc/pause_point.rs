//! Pause points — awaitable handles for one pending pause condition.
//!
//! A pause point is created and registered by the engine, then fulfilled
//! at most once when the simulator reports a `sim:pause` event naming it.
//! Fulfilment stores the completion value and wakes the waiter; later
//! fulfilments are ignored.
//!
//! A point removed from the engine before it fires is never fulfilled, so
//! its [`wait`](PausePoint::wait) never completes.  Callers must not await
//! a point they removed themselves.

use std::cell::RefCell;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Condition under which the simulator stops and reports a pause point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PauseCondition {
    /// Stop when simulated time reaches `nanos`.
    TimeAbsolute { nanos: u64 },
    /// Stop `nanos` after the point is added.
    TimeRelative { nanos: u64 },
    /// Stop when the serial output contains `bytes`.
    SerialBytes { bytes: Vec<u8> },
}

impl PauseCondition {
    /// Wire name of the condition type, also the suffix of generated ids.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TimeAbsolute { .. } => "time-absolute",
            Self::TimeRelative { .. } => "time-relative",
            Self::SerialBytes { .. } => "serial-bytes",
        }
    }

    /// Parameters of the `pause-point:add` command: `{id, type, ...}`.
    pub(crate) fn add_params(&self, id: &str) -> Value {
        let mut params = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()));
        if let Value::Object(map) = &mut params {
            map.insert("id".into(), Value::String(id.to_owned()));
        }
        params
    }
}

struct Completion {
    value: RefCell<Option<Value>>,
    ready: Signal<NoopRawMutex, ()>,
}

/// Handle to one registered pause condition.
///
/// Cloning is cheap; every clone observes the same completion.
#[derive(Clone)]
pub struct PausePoint {
    id: Rc<str>,
    condition: Rc<PauseCondition>,
    completion: Rc<Completion>,
}

impl PausePoint {
    pub(crate) fn new(id: String, condition: PauseCondition) -> Self {
        Self {
            id: id.into(),
            condition: Rc::new(condition),
            completion: Rc::new(Completion {
                value: RefCell::new(None),
                ready: Signal::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn condition(&self) -> &PauseCondition {
        &self.condition
    }

    pub fn is_fulfilled(&self) -> bool {
        self.completion.value.borrow().is_some()
    }

    /// Store the completion value and wake the waiter.
    ///
    /// Returns `false` (and changes nothing) if already fulfilled.
    pub(crate) fn fulfill(&self, value: Value) -> bool {
        {
            let mut slot = self.completion.value.borrow_mut();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.completion.ready.signal(());
        true
    }

    /// Suspend until the simulator reaches this point; yields the info the
    /// simulator attached to it (`null` if none).
    ///
    /// Once fulfilled, every call returns the stored value immediately.
    pub async fn wait(&self) -> Value {
        loop {
            if let Some(value) = self.completion.value.borrow().as_ref() {
                return value.clone();
            }
            self.completion.ready.wait().await;
        }
    }
}

impl core::fmt::Debug for PausePoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PausePoint")
            .field("id", &self.id)
            .field("condition", &self.condition)
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}
