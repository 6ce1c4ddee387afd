//! In-memory stand-in for the remote automation interface.
//!
//! [`MockObject`] implements [`Dispatch`] over a property map plus
//! registered method closures, so wrappers can be exercised without CANoe.
//! It reproduces the failure modes the real adapter surfaces: unknown
//! members are `NotFound`, an [`invalidate`](MockObject::invalidate)d
//! object fails every call with `RemoteUnavailable`, and collection lookups
//! outside `1..=Count` are `NotFound`.
//!
//! Compiled for unit tests and behind the `test-support` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{CanoeError, Result};
use crate::event::EventSink;
use crate::proxy::{Dispatch, Handle, Subscription};
use crate::value::{FromValue, Value};

type Method = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
type Sinks = Arc<Mutex<Vec<(u64, Arc<dyn EventSink>)>>>;

struct MockState {
    name: String,
    props: Mutex<HashMap<String, Value>>,
    indexed: Mutex<HashMap<(String, String), Value>>,
    methods: Mutex<HashMap<String, Method>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    puts: Mutex<HashMap<String, usize>>,
    sinks: Sinks,
    next_cookie: AtomicU64,
    invalid: AtomicBool,
}

/// In-memory automation object.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockObject {
    state: Arc<MockState>,
}

impl MockObject {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(MockState {
                name: name.to_owned(),
                props: Mutex::new(HashMap::new()),
                indexed: Mutex::new(HashMap::new()),
                methods: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                puts: Mutex::new(HashMap::new()),
                sinks: Arc::new(Mutex::new(Vec::new())),
                next_cookie: AtomicU64::new(1),
                invalid: AtomicBool::new(false),
            }),
        }
    }

    /// A fresh [`Handle`] onto this object.
    pub fn handle(&self) -> Handle {
        Handle::new(self.clone())
    }

    pub fn with_prop(self, name: &str, value: impl Into<Value>) -> Self {
        self.set_prop(name, value);
        self
    }

    pub fn set_prop(&self, name: &str, value: impl Into<Value>) {
        self.state.props.lock().insert(name.to_owned(), value.into());
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.state.props.lock().get(name).cloned()
    }

    /// Set a parameterized property, e.g. `Mute(1)`.
    pub fn set_indexed(&self, name: &str, index: impl Into<Value>, value: impl Into<Value>) {
        let key = (name.to_owned(), index.into().to_string());
        self.state.indexed.lock().insert(key, value.into());
    }

    /// Register a method implementation.
    pub fn on_call(
        &self,
        name: &str,
        f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.state.methods.lock().insert(name.to_owned(), Arc::new(f));
    }

    /// Make every subsequent call fail as if the server dropped the object.
    pub fn invalidate(&self) {
        self.state.invalid.store(true, Ordering::SeqCst);
    }

    /// Method calls received so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.calls.lock().iter().filter(|(n, _)| n == name).count()
    }

    pub fn put_count(&self, name: &str) -> usize {
        self.state.puts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn sink_count(&self) -> usize {
        self.state.sinks.lock().len()
    }

    /// Deliver a notification to every advised sink, as the server would.
    pub fn fire(&self, event: &str, args: &[Value]) {
        let sinks: Vec<Arc<dyn EventSink>> =
            self.state.sinks.lock().iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            sink.notify(event, args);
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.state.invalid.load(Ordering::SeqCst) {
            Err(CanoeError::RemoteUnavailable(format!(
                "{}: object is no longer connected",
                self.state.name
            )))
        } else {
            Ok(())
        }
    }

    fn missing(&self, member: &str) -> CanoeError {
        CanoeError::NotFound(format!("{}.{member}: unknown member", self.state.name))
    }

    fn method(&self, name: &str) -> Option<Method> {
        self.state.methods.lock().get(name).cloned()
    }
}

impl Dispatch for MockObject {
    fn get(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.check_live()?;
        if let Some(index) = args.first() {
            let key = (name.to_owned(), index.to_string());
            if let Some(v) = self.state.indexed.lock().get(&key).cloned() {
                return Ok(v);
            }
            // Parameterized reads of methods (e.g. `Item(i)`) go to the closure.
            return match self.method(name) {
                Some(m) => m(args),
                None => Err(self.missing(name)),
            };
        }
        if let Some(v) = self.state.props.lock().get(name).cloned() {
            return Ok(v);
        }
        match self.method(name) {
            Some(m) => m(args),
            None => Err(self.missing(name)),
        }
    }

    fn put(&self, name: &str, args: &[Value], value: Value) -> Result<()> {
        self.check_live()?;
        *self.state.puts.lock().entry(name.to_owned()).or_insert(0) += 1;
        match args.first() {
            Some(index) => {
                let key = (name.to_owned(), index.to_string());
                self.state.indexed.lock().insert(key, value.clone());
            }
            None => {
                self.state.props.lock().insert(name.to_owned(), value.clone());
            }
        }
        let sinks: Vec<Arc<dyn EventSink>> =
            self.state.sinks.lock().iter().map(|(_, s)| s.clone()).collect();
        if name == "Value" && args.is_empty() {
            for sink in sinks {
                sink.notify(crate::event::ON_CHANGE, &[value.clone()]);
            }
        }
        Ok(())
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.check_live()?;
        self.state.calls.lock().push((name.to_owned(), args.to_vec()));
        match self.method(name) {
            Some(m) => m(args),
            None => Err(self.missing(name)),
        }
    }

    fn advise(&self, sink: Arc<dyn EventSink>) -> Result<Subscription> {
        self.check_live()?;
        let cookie = self.state.next_cookie.fetch_add(1, Ordering::SeqCst);
        self.state.sinks.lock().push((cookie, sink));
        let sinks = self.state.sinks.clone();
        Ok(Subscription::new(move || {
            sinks.lock().retain(|(c, _)| *c != cookie);
        }))
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

type Factory = Arc<dyn Fn(&[Value]) -> Result<MockObject> + Send + Sync>;

/// Mock of a 1-based automation collection (`Count`, `Item`, `Add`, `Remove`).
///
/// `Item` accepts a 1-based index or the item's `Name`.
#[derive(Clone)]
pub struct MockCollection {
    object: MockObject,
    items: Arc<Mutex<Vec<MockObject>>>,
}

impl MockCollection {
    pub fn new(name: &str) -> Self {
        let object = MockObject::new(name);
        let items: Arc<Mutex<Vec<MockObject>>> = Arc::new(Mutex::new(Vec::new()));

        let count_items = items.clone();
        object.on_call("Count", move |_| Ok(Value::Int(count_items.lock().len() as i64)));

        let lookup_items = items.clone();
        let coll_name = name.to_owned();
        object.on_call("Item", move |args| {
            let items = lookup_items.lock();
            let found = match args.first() {
                Some(Value::Str(key)) => items
                    .iter()
                    .find(|o| matches!(o.prop("Name"), Some(Value::Str(n)) if n == *key)),
                Some(other) => {
                    let idx = i64::from_value(other.clone())?;
                    usize::try_from(idx)
                        .ok()
                        .and_then(|i| i.checked_sub(1))
                        .and_then(|i| items.get(i))
                }
                None => {
                    return Err(CanoeError::InvalidArgument(format!(
                        "{coll_name}.Item: missing index"
                    )))
                }
            };
            found
                .map(|o| Value::Object(o.handle()))
                .ok_or_else(|| CanoeError::NotFound(format!("{coll_name}.Item({:?})", args[0])))
        });

        let remove_items = items.clone();
        let coll_name = name.to_owned();
        object.on_call("Remove", move |args| {
            let mut items = remove_items.lock();
            let pos = match args.first() {
                Some(Value::Str(key)) => items
                    .iter()
                    .position(|o| matches!(o.prop("Name"), Some(Value::Str(n)) if n == *key)),
                Some(other) => {
                    let idx = i64::from_value(other.clone())?;
                    usize::try_from(idx)
                        .ok()
                        .and_then(|i| i.checked_sub(1))
                        .filter(|&i| i < items.len())
                }
                None => None,
            };
            match pos {
                Some(p) => {
                    items.remove(p);
                    Ok(Value::Empty)
                }
                None => Err(CanoeError::NotFound(format!("{coll_name}.Remove"))),
            }
        });

        Self { object, items }
    }

    pub fn handle(&self) -> Handle {
        self.object.handle()
    }

    pub fn object(&self) -> &MockObject {
        &self.object
    }

    pub fn push(&self, item: MockObject) {
        self.items.lock().push(item);
    }

    pub fn with_item(self, item: MockObject) -> Self {
        self.push(item);
        self
    }

    pub fn get(&self, zero_based: usize) -> Option<MockObject> {
        self.items.lock().get(zero_based).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Support creation through `method` (e.g. `Add`, `AddWriteable`).
    pub fn on_add(&self, method: &str, factory: impl Fn(&[Value]) -> Result<MockObject> + Send + Sync + 'static) {
        let factory: Factory = Arc::new(factory);
        let items = self.items.clone();
        self.object.on_call(method, move |args| {
            let created = factory(args)?;
            items.lock().push(created.clone());
            Ok(Value::Object(created.handle()))
        });
    }
}
