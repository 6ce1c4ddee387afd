//! Collection wrapper base.
//!
//! [`Collection<T>`] wraps an automation collection (`Count` / `Item` /
//! optionally `Add` / `Remove`) and constructs child wrappers on demand.
//! Indices on this side are 0-based; the remote collections are 1-based, so
//! `item(i)` is sent as `Item(i + 1)`.
//!
//! Every lookup is a fresh round trip.  Two calls to `item(0)` may observe
//! different remote state if the collection changed in between, and the
//! returned wrappers are not identity-comparable.

use std::fmt;
use std::marker::PhantomData;

use crate::errors::{CanoeError, Result};
use crate::proxy::{Handle, Proxy};
use crate::value::Value;

/// Key for [`Collection::item`] and [`Collection::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    /// 0-based position.
    Index(usize),
    /// Name of the element.
    Name(String),
}

impl ItemKey {
    /// Remote form of the key.  An index with no 1-based `i64` counterpart
    /// can never resolve, so it is `NotFound` without a round trip.
    fn to_remote(&self) -> Result<Value> {
        match self {
            ItemKey::Index(i) => i64::try_from(*i)
                .ok()
                .and_then(|n| n.checked_add(1))
                .map(Value::Int)
                .ok_or_else(|| CanoeError::NotFound(format!("no element at {self}"))),
            ItemKey::Name(n) => Ok(Value::Str(n.clone())),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Index(i) => write!(f, "index {i}"),
            ItemKey::Name(n) => write!(f, "'{n}'"),
        }
    }
}

impl From<usize> for ItemKey {
    fn from(i: usize) -> Self {
        ItemKey::Index(i)
    }
}

impl From<&str> for ItemKey {
    fn from(n: &str) -> Self {
        ItemKey::Name(n.to_owned())
    }
}

impl From<String> for ItemKey {
    fn from(n: String) -> Self {
        ItemKey::Name(n)
    }
}

/// Lazily-materialized automation collection of `T` wrappers.
pub struct Collection<T> {
    handle: Handle,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("item", &std::any::type_name::<T>())
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T> Proxy for Collection<T> {
    fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _item: PhantomData,
        }
    }

    fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Map a failed lookup to `NotFound`; transport failures pass through.
fn lookup_error(err: CanoeError, what: String) -> CanoeError {
    match err {
        CanoeError::NotFound(_) | CanoeError::InvalidArgument(_) | CanoeError::ComError(_) => {
            CanoeError::NotFound(what)
        }
        other => other,
    }
}

impl<T: Proxy> Collection<T> {
    /// Number of elements currently in the remote collection.
    pub fn count(&self) -> Result<usize> {
        self.handle.get("Count")
    }

    /// Wrapper for the element at `key`.
    ///
    /// Fails with `NotFound` when the index is out of range or the name does
    /// not resolve.
    pub fn item(&self, key: impl Into<ItemKey>) -> Result<T> {
        let key = key.into();
        let value = self
            .handle
            .invoke("Item", &[key.to_remote()?])
            .map_err(|e| lookup_error(e, format!("no element at {key}")))?;
        match value {
            Value::Object(h) => Ok(T::from_handle(h)),
            _ => Err(CanoeError::NotFound(format!("no element at {key}"))),
        }
    }

    /// Lazily iterate the collection.
    ///
    /// `Count` is read once up front; each element is fetched when the
    /// iterator reaches it.
    pub fn iter(&self) -> Result<CollectionIter<T>> {
        Ok(CollectionIter {
            collection: self.clone(),
            next: 0,
            len: self.count()?,
        })
    }

    /// Create an element via the collection's `Add` method.
    pub fn add(&self, args: &[Value]) -> Result<T> {
        self.add_with("Add", args)
    }

    /// Create an element via a named creation method (`AddEx`, ...).
    pub fn add_with(&self, method: &str, args: &[Value]) -> Result<T> {
        self.handle.call_child(method, args)
    }

    /// Delete the element at `key`.
    pub fn remove(&self, key: impl Into<ItemKey>) -> Result<()> {
        let key = key.into();
        self.handle
            .invoke("Remove", &[key.to_remote()?])
            .map_err(|e| lookup_error(e, format!("cannot remove element at {key}")))?;
        Ok(())
    }
}

/// Iterator returned by [`Collection::iter`].
pub struct CollectionIter<T> {
    collection: Collection<T>,
    next: usize,
    len: usize,
}

impl<T: Proxy> Iterator for CollectionIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(self.collection.item(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.len - self.next;
        (rest, Some(rest))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCollection, MockObject};
    use crate::value::FromValue;

    proxy! {
        struct Entry;
    }

    impl Entry {
        getters! {
            name: String => "Name";
        }
    }

    fn entries(n: usize) -> MockCollection {
        let coll = MockCollection::new("Entries");
        for i in 0..n {
            coll.push(MockObject::new("Entry").with_prop("Name", format!("e{i}")));
        }
        coll
    }

    #[test]
    fn test_item_in_range_never_not_found() {
        let mock = entries(4);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        let count = coll.count().unwrap();
        assert_eq!(count, 4);
        for i in 0..count {
            assert_eq!(coll.item(i).unwrap().name().unwrap(), format!("e{i}"));
        }
    }

    #[test]
    fn test_item_out_of_range_is_not_found() {
        let mock = entries(2);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        for i in [2usize, 3, 100] {
            assert!(matches!(coll.item(i), Err(CanoeError::NotFound(_))));
        }
        let empty: Collection<Entry> = Collection::from_handle(entries(0).handle());
        assert!(matches!(empty.item(0), Err(CanoeError::NotFound(_))));
    }

    #[test]
    fn test_huge_index_is_not_found() {
        let mock = entries(1);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        for i in [i64::MAX as usize, usize::MAX] {
            assert!(matches!(coll.item(i), Err(CanoeError::NotFound(_))));
            assert!(matches!(coll.remove(i), Err(CanoeError::NotFound(_))));
        }
        assert_eq!(mock.len(), 1);
    }

    #[test]
    fn test_item_by_name() {
        let coll: Collection<Entry> = Collection::from_handle(entries(3).handle());
        assert_eq!(coll.item("e2").unwrap().name().unwrap(), "e2");
        assert!(matches!(coll.item("zz"), Err(CanoeError::NotFound(_))));
    }

    #[test]
    fn test_lookups_are_not_cached() {
        let mock = entries(1);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        assert_eq!(coll.item(0).unwrap().name().unwrap(), "e0");

        mock.get(0).unwrap().set_prop("Name", "changed");
        assert_eq!(coll.item(0).unwrap().name().unwrap(), "changed");
        assert_eq!(mock.object().call_count("Item"), 2);
    }

    #[test]
    fn test_add_and_remove() {
        let mock = entries(1);
        mock.on_add("Add", |args| {
            let name = String::from_value(args[0].clone())?;
            Ok(MockObject::new("Entry").with_prop("Name", name))
        });
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());

        let added = coll.add(&[Value::from("fresh")]).unwrap();
        assert_eq!(added.name().unwrap(), "fresh");
        assert_eq!(coll.count().unwrap(), 2);

        coll.remove(0).unwrap();
        assert_eq!(coll.count().unwrap(), 1);
        assert_eq!(coll.item(0).unwrap().name().unwrap(), "fresh");
        assert!(matches!(coll.remove(5), Err(CanoeError::NotFound(_))));
    }

    #[test]
    fn test_iter_is_lazy_and_complete() {
        let mock = entries(3);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        let mut it = coll.iter().unwrap();
        assert_eq!(it.size_hint(), (3, Some(3)));
        assert_eq!(mock.object().call_count("Item"), 0);
        let names: Vec<String> = it
            .by_ref()
            .map(|e| e.and_then(|e| e.name()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn test_invalidated_collection_stays_remote_unavailable() {
        let mock = entries(2);
        let coll: Collection<Entry> = Collection::from_handle(mock.handle());
        mock.object().invalidate();
        assert!(matches!(coll.item(0), Err(CanoeError::RemoteUnavailable(_))));
        assert!(matches!(coll.count(), Err(CanoeError::RemoteUnavailable(_))));
    }
}
