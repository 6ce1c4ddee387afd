//! Event-sink / notification bridge.
//!
//! The remote application delivers notifications on threads this crate does
//! not control (COM RPC worker threads in the MTA).  Sinks therefore keep
//! all state behind a `parking_lot::Mutex` and hand out owned snapshots.
//!
//! * [`ValueSink`] -- single-slot mailbox for variable value changes.
//!   Latest value wins: a second notification before consumption overwrites
//!   the first, there is no queue.
//! * [`EventLatch`] -- named one-shot flags for lifecycle notifications
//!   (configuration opened, measurement started, ...).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::value::Value;

/// Callback target registered with the remote application.
///
/// `event` is the name of the source-interface member being invoked
/// (e.g. `"OnChange"`); `args` are its positional parameters.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &str, args: &[Value]);
}

// ---------------------------------------------------------------------------
// ValueSink
// ---------------------------------------------------------------------------

/// Field key for the changed value.
pub const FIELD_VALUE: &str = "value";
/// Field key for the high-order time component.
pub const FIELD_TIME_HIGH: &str = "time_high";
/// Field key for the low-order time component.
pub const FIELD_TIME: &str = "time";

/// Event name of the simple value-changed notification.
pub const ON_CHANGE: &str = "OnChange";
/// Event name of the timestamped value-changed notification.
pub const ON_CHANGE_AND_TIME: &str = "OnChangeAndTime";

/// Sink state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SinkState {
    /// No notification received since the last consume/clear.
    Idle,
    /// A notification has been received and not yet consumed.
    Updated,
}

/// Owned copy of a sink's mapping and flag, read under one lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkSnapshot {
    pub fields: BTreeMap<String, Value>,
    pub state: SinkState,
}

impl SinkSnapshot {
    pub fn value(&self) -> Option<&Value> {
        self.fields.get(FIELD_VALUE)
    }

    pub fn is_updated(&self) -> bool {
        self.state == SinkState::Updated
    }
}

#[derive(Debug)]
struct SinkInner {
    fields: BTreeMap<String, Value>,
    updated: bool,
}

/// Single-slot mailbox fed by variable change notifications.
///
/// Mapping and flag are one unit of shared state: a reader never observes
/// the flag set without the fields written by the same notification.
#[derive(Debug)]
pub struct ValueSink {
    inner: Mutex<SinkInner>,
    changed: Condvar,
}

impl Default for ValueSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                fields: BTreeMap::new(),
                updated: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Simple value-changed entry point.
    pub fn on_change(&self, value: Value) {
        let mut inner = self.inner.lock();
        inner.fields.insert(FIELD_VALUE.to_owned(), value);
        inner.updated = true;
        drop(inner);
        self.changed.notify_all();
    }

    /// Timestamped value-changed entry point.
    pub fn on_change_and_time(&self, value: Value, time_high: Value, time: Value) {
        let mut inner = self.inner.lock();
        inner.fields.insert(FIELD_VALUE.to_owned(), value);
        inner.fields.insert(FIELD_TIME_HIGH.to_owned(), time_high);
        inner.fields.insert(FIELD_TIME.to_owned(), time);
        inner.updated = true;
        drop(inner);
        self.changed.notify_all();
    }

    pub fn state(&self) -> SinkState {
        if self.inner.lock().updated {
            SinkState::Updated
        } else {
            SinkState::Idle
        }
    }

    pub fn is_updated(&self) -> bool {
        self.inner.lock().updated
    }

    /// Mapping and flag as they were at one instant.
    pub fn snapshot(&self) -> SinkSnapshot {
        let inner = self.inner.lock();
        SinkSnapshot {
            fields: inner.fields.clone(),
            state: if inner.updated {
                SinkState::Updated
            } else {
                SinkState::Idle
            },
        }
    }

    /// Consume a pending notification (`Updated -> Idle`).
    ///
    /// Returns `None` when the sink is `Idle`.  The recorded fields stay
    /// readable through [`snapshot`](ValueSink::snapshot).
    pub fn take(&self) -> Option<BTreeMap<String, Value>> {
        let mut inner = self.inner.lock();
        if !inner.updated {
            return None;
        }
        inner.updated = false;
        Some(inner.fields.clone())
    }

    /// Drop the pending flag without reading (`Updated -> Idle`).
    pub fn clear(&self) {
        self.inner.lock().updated = false;
    }

    /// Block until the sink is `Updated` or `timeout` elapses.
    ///
    /// Does not consume; returns the resulting updated flag.
    pub fn wait_updated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.updated {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.updated;
            }
        }
        true
    }
}

impl EventSink for ValueSink {
    fn notify(&self, event: &str, args: &[Value]) {
        match (event, args) {
            (ON_CHANGE, [value, ..]) => self.on_change(value.clone()),
            (ON_CHANGE_AND_TIME, [value, time_high, time, ..]) => {
                self.on_change_and_time(value.clone(), time_high.clone(), time.clone())
            }
            _ => tracing::debug!(event, args = args.len(), "ValueSink: ignoring notification"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventLatch
// ---------------------------------------------------------------------------

type Hook = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Default)]
struct LatchInner {
    fired: HashMap<String, Vec<Value>>,
}

/// Named one-shot flags for lifecycle notifications.
///
/// Each notification sets its flag and stores its payload; waiters reset a
/// flag, trigger the remote action, then [`wait`](EventLatch::wait).
/// Hooks registered with [`on`](EventLatch::on) run inside the callback
/// context before the flag is set.
#[derive(Default)]
pub struct EventLatch {
    inner: Mutex<LatchInner>,
    hooks: Mutex<HashMap<String, Hook>>,
    fired: Condvar,
}

impl EventLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` whenever `event` is delivered.
    pub fn on(&self, event: &str, hook: impl Fn(&[Value]) + Send + Sync + 'static) {
        self.hooks.lock().insert(event.to_owned(), Arc::new(hook));
    }

    pub fn reset(&self, event: &str) {
        self.inner.lock().fired.remove(event);
    }

    pub fn is_set(&self, event: &str) -> bool {
        self.inner.lock().fired.contains_key(event)
    }

    /// Payload of the last delivery of `event`, if its flag is set.
    pub fn payload(&self, event: &str) -> Option<Vec<Value>> {
        self.inner.lock().fired.get(event).cloned()
    }

    /// Block until `event` is set or `timeout` elapses.
    pub fn wait(&self, event: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.fired.contains_key(event) {
            if self.fired.wait_until(&mut inner, deadline).timed_out() {
                return inner.fired.contains_key(event);
            }
        }
        true
    }
}

impl EventSink for EventLatch {
    fn notify(&self, event: &str, args: &[Value]) {
        let hook = self.hooks.lock().get(event).cloned();
        if let Some(hook) = hook {
            hook(args);
        }
        self.inner.lock().fired.insert(event.to_owned(), args.to_vec());
        self.fired.notify_all();
    }
}

impl std::fmt::Debug for EventLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fired: Vec<String> = self.inner.lock().fired.keys().cloned().collect();
        fired.sort();
        f.debug_struct("EventLatch").field("fired", &fired).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
