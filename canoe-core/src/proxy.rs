//! Handle wrapper base.
//!
//! A [`Handle`] is a reference to one externally-owned automation object.
//! The remote application owns the object's lifetime; when it invalidates
//! the object, the next accessor call fails with
//! [`CanoeError::RemoteUnavailable`](crate::errors::CanoeError) and nothing
//! here can detect that earlier.
//!
//! Wrappers ([`Proxy`] implementors) hold exactly one `Handle` and expose
//! typed accessors that each perform a single remote round trip.  Nothing is
//! cached, nothing is retried.
//!
//! # Capability interface
//!
//! [`Dispatch`] is the late-bound surface every wrapper is written against.
//! `com::ComObject` implements it over `IDispatch` on Windows and
//! `mock::MockObject` implements it in memory for tests.

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::event::EventSink;
use crate::value::{FromValue, Value};

// ---------------------------------------------------------------------------
// Capability interface
// ---------------------------------------------------------------------------

/// Late-bound access to one remote automation object.
///
/// `args` on [`get`](Dispatch::get) / [`put`](Dispatch::put) carry the index
/// of a parameterized property (e.g. `Mute(line)`); they are empty for plain
/// properties.
pub trait Dispatch: Send + Sync {
    /// Read a (possibly parameterized) property.
    fn get(&self, name: &str, args: &[Value]) -> Result<Value>;

    /// Write a (possibly parameterized) property.
    fn put(&self, name: &str, args: &[Value], value: Value) -> Result<()>;

    /// Invoke a method.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value>;

    /// Register `sink` for the object's outgoing notifications.
    ///
    /// The registration lasts until the returned [`Subscription`] is dropped.
    fn advise(&self, sink: Arc<dyn EventSink>) -> Result<Subscription>;
}

/// Live event registration; unregisters on drop.
#[must_use = "dropping a Subscription immediately unregisters the sink"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable reference to a remote automation object.
///
/// Two handles obtained from separate lookups of the "same" child are not
/// guaranteed to compare equal with [`Handle::ptr_eq`]; identity is not
/// meaningful across lookups.
#[derive(Clone)]
pub struct Handle(Arc<dyn Dispatch>);

impl Handle {
    pub fn new(object: impl Dispatch + 'static) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn Dispatch>) -> Self {
        Self(object)
    }

    /// `true` if both handles point at the same local adapter.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read a property and convert it to `T`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.0.get(name, &[])?)
    }

    /// Read a parameterized property and convert it to `T`.
    pub fn get_at<T: FromValue>(&self, name: &str, args: &[Value]) -> Result<T> {
        T::from_value(self.0.get(name, args)?)
    }

    /// Write a property.
    pub fn put(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.0.put(name, &[], value.into())
    }

    /// Write a parameterized property.
    pub fn put_at(&self, name: &str, args: &[Value], value: impl Into<Value>) -> Result<()> {
        self.0.put(name, args, value.into())
    }

    /// Invoke a method and convert its result to `T`.
    pub fn call<T: FromValue>(&self, name: &str, args: &[Value]) -> Result<T> {
        T::from_value(self.0.call(name, args)?)
    }

    /// Invoke a method and return the raw result.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.0.call(name, args)
    }

    /// Read an object-valued property and wrap it.
    pub fn child<W: Proxy>(&self, name: &str) -> Result<W> {
        self.get::<Handle>(name).map(W::from_handle)
    }

    /// Like [`child`](Handle::child) but maps an empty result to `None`.
    pub fn child_opt<W: Proxy>(&self, name: &str) -> Result<Option<W>> {
        Ok(self.get::<Option<Handle>>(name)?.map(W::from_handle))
    }

    /// Invoke a method returning an object and wrap it.
    pub fn call_child<W: Proxy>(&self, name: &str, args: &[Value]) -> Result<W> {
        self.call::<Handle>(name, args).map(W::from_handle)
    }

    pub fn advise(&self, sink: Arc<dyn EventSink>) -> Result<Subscription> {
        self.0.advise(sink)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// ---------------------------------------------------------------------------
// Wrapper trait + declaration macros
// ---------------------------------------------------------------------------

/// A local proxy over exactly one [`Handle`].
pub trait Proxy: Sized {
    fn from_handle(handle: Handle) -> Self;
    fn handle(&self) -> &Handle;
}

/// Declare a single-field wrapper type implementing [`Proxy`].
#[macro_export]
macro_rules! proxy {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            handle: $crate::proxy::Handle,
        }

        impl $crate::proxy::Proxy for $name {
            fn from_handle(handle: $crate::proxy::Handle) -> Self {
                Self { handle }
            }

            fn handle(&self) -> &$crate::proxy::Handle {
                &self.handle
            }
        }
    };
}

/// Declare typed read accessors inside an `impl` block of a [`Proxy`].
///
/// `fn_name: Type => "RemoteName";` expands to
/// `pub fn fn_name(&self) -> Result<Type>`.
#[macro_export]
macro_rules! getters {
    ($($(#[$meta:meta])* $fn_name:ident : $ty:ty => $remote:literal;)*) => {
        $(
            $(#[$meta])*
            pub fn $fn_name(&self) -> $crate::errors::Result<$ty> {
                $crate::proxy::Proxy::handle(self).get($remote)
            }
        )*
    };
}

/// Declare typed write accessors inside an `impl` block of a [`Proxy`].
#[macro_export]
macro_rules! setters {
    ($($(#[$meta:meta])* $fn_name:ident : $ty:ty => $remote:literal;)*) => {
        $(
            $(#[$meta])*
            pub fn $fn_name(&self, value: $ty) -> $crate::errors::Result<()> {
                $crate::proxy::Proxy::handle(self).put($remote, value)
            }
        )*
    };
}

/// Declare child-object accessors inside an `impl` block of a [`Proxy`].
#[macro_export]
macro_rules! children {
    ($($(#[$meta:meta])* $fn_name:ident : $ty:ty => $remote:literal;)*) => {
        $(
            $(#[$meta])*
            pub fn $fn_name(&self) -> $crate::errors::Result<$ty> {
                $crate::proxy::Proxy::handle(self).child($remote)
            }
        )*
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CanoeError;
    use crate::mock::MockObject;

    proxy! {
        /// Wrapper used only by these tests.
        struct Widget;
    }

    impl Widget {
        getters! {
            name: String => "Name";
            enabled: bool => "Enabled";
            count: i32 => "Count";
            ratio: f64 => "Ratio";
            payload: Vec<u8> => "Payload";
        }

        setters! {
            set_name: &str => "Name";
            set_enabled: bool => "Enabled";
            set_count: i32 => "Count";
            set_ratio: f64 => "Ratio";
            set_payload: Vec<u8> => "Payload";
        }

        children! {
            parent: Widget => "Parent";
        }
    }

    fn widget() -> (MockObject, Widget) {
        let mock = MockObject::new("Widget");
        mock.set_prop("Name", "w");
        mock.set_prop("Enabled", false);
        mock.set_prop("Count", 0);
        mock.set_prop("Ratio", 0.0);
        mock.set_prop("Payload", Vec::<u8>::new());
        let w = Widget::from_handle(mock.handle());
        (mock, w)
    }

    #[test]
    fn test_write_then_read_returns_written_value() {
        let (_mock, w) = widget();

        w.set_name("renamed").unwrap();
        assert_eq!(w.name().unwrap(), "renamed");

        w.set_enabled(true).unwrap();
        assert!(w.enabled().unwrap());

        w.set_count(-12).unwrap();
        assert_eq!(w.count().unwrap(), -12);

        w.set_ratio(0.25).unwrap();
        assert_eq!(w.ratio().unwrap(), 0.25);

        w.set_payload(vec![0x10, 0x03]).unwrap();
        assert_eq!(w.payload().unwrap(), vec![0x10, 0x03]);
    }

    #[test]
    fn test_invalidated_object_surfaces_remote_unavailable() {
        let (mock, w) = widget();
        mock.invalidate();
        assert!(matches!(w.name(), Err(CanoeError::RemoteUnavailable(_))));
        assert!(matches!(w.set_count(1), Err(CanoeError::RemoteUnavailable(_))));
    }

    #[test]
    fn test_write_is_issued_exactly_once() {
        let (mock, w) = widget();
        w.set_count(3).unwrap();
        assert_eq!(mock.put_count("Count"), 1);
    }

    #[test]
    fn test_child_wraps_fresh_handle() {
        let (mock, w) = widget();
        let parent = MockObject::new("Parent");
        parent.set_prop("Name", "root");
        mock.set_prop("Parent", parent.handle());

        let p = w.parent().unwrap();
        assert_eq!(p.name().unwrap(), "root");
    }

    #[test]
    fn test_missing_member_is_not_found() {
        let (_mock, w) = widget();
        assert!(matches!(
            w.handle().get::<String>("Nope"),
            Err(CanoeError::NotFound(_))
        ));
    }

    #[test]
    fn test_subscription_runs_cancel_once_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = Subscription::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
