//! Identity-bearing object handles.
//!
//! An [`Object`] wraps an arbitrary `Any + Send + Sync` payload behind an
//! `Arc` and carries a process-unique [`ObjectId`]. Side tables (bindings,
//! resources) are keyed by that id and hold objects weakly, so binding an
//! object never extends its lifetime: when the last handle is dropped, its
//! side-table entries are released.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::value::Value;

static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObjectInner {
    id: ObjectId,
    display_name: &'static str,
    payload: Box<dyn Any + Send + Sync>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        crate::binding::release(self.id);
        crate::resource::release(self.id);
    }
}

// =============================================================================
// Object
// =============================================================================

/// A cheaply clonable handle to a shared payload, compared by identity.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

impl Object {
    /// Wraps `payload` in a new object with a fresh identity.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        let type_name = std::any::type_name::<T>();
        let display_name = type_name
            .split('<')
            .next()
            .and_then(|name| name.rsplit("::").next())
            .unwrap_or(type_name);
        Self::with_display_name(payload, display_name)
    }

    fn with_display_name<T: Any + Send + Sync>(payload: T, display_name: &'static str) -> Self {
        Self(Arc::new(ObjectInner {
            id: ObjectId::next(),
            display_name,
            payload: Box::new(payload),
        }))
    }

    /// Creates an object with an empty property bag.
    pub fn plain() -> Self {
        Self::with_display_name(Fields::default(), "Object")
    }

    /// Creates an object whose property bag holds `fields`.
    pub fn with_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::with_display_name(Fields::from_iter(fields), "Object")
    }

    /// Creates a clone carrier pointing back at `target`.
    pub(crate) fn carrier(target: Option<Object>) -> Self {
        Self::with_display_name(Carrier { target }, "Object")
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub(crate) fn display_name(&self) -> &'static str {
        self.0.display_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.payload.downcast_ref()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.payload.is::<T>()
    }

    /// The property bag of objects created by [`Object::plain`] or
    /// [`Object::with_fields`].
    pub fn fields(&self) -> Option<&Fields> {
        self.downcast_ref()
    }

    /// Returns `true` if this object was allocated as a clone carrier.
    pub fn is_carrier(&self) -> bool {
        self.is::<Carrier>()
    }

    /// Reads a property.
    ///
    /// Property bags return the stored value. A clone carrier exposes its
    /// logical target under `object`. Everything else reads as `Undefined`.
    pub fn property(&self, name: &str) -> Value {
        if let Some(fields) = self.fields() {
            return fields.get(name);
        }
        match self.downcast_ref::<Carrier>() {
            Some(carrier) if name == "object" => carrier.target.clone().into(),
            _ => Value::Undefined,
        }
    }

    /// Writes a property on a property bag. Returns `false` for any other
    /// payload.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.fields() {
            Some(fields) => {
                fields.set(name, value);
                true
            }
            None => false,
        }
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Object {}

impl std::hash::Hash for Object {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({} {})", self.0.id, self.0.display_name)
    }
}

/// A non-owning reference to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    id: ObjectId,
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(Object)
    }

    /// Returns `true` if `object` is the object this reference points to.
    pub fn is(&self, object: &Object) -> bool {
        self.id == object.id()
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject({})", self.id)
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A string-keyed property bag.
#[derive(Debug, Default)]
pub struct Fields(RwLock<BTreeMap<String, Value>>);

impl Fields {
    pub fn get(&self, name: &str) -> Value {
        self.0.read().get(name).cloned().unwrap_or_default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let previous = self.0.write().insert(name.into(), value.into());
        drop(previous);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.read().contains_key(name)
    }

    /// Copies the current contents out of the bag.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.0.read().clone()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(RwLock::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }
}

/// Payload of a clone carrier: nothing but a back-pointer to the logical
/// target (`None` when the carrier was allocated for a null target).
pub(crate) struct Carrier {
    target: Option<Object>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let a = Object::plain();
        let b = Object::plain();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_downcast() {
        struct Counter(u32);

        let object = Object::new(Counter(7));
        assert!(object.is::<Counter>());
        assert_eq!(object.downcast_ref::<Counter>().map(|c| c.0), Some(7));
        assert!(object.fields().is_none());
        assert_eq!(format!("{object:?}"), format!("Object({} Counter)", object.id()));
    }

    #[test]
    fn test_fields() {
        let object = Object::with_fields([("name", "tether")]);
        assert_eq!(object.property("name"), Value::from("tether"));
        assert_eq!(object.property("missing"), Value::Undefined);

        assert!(object.set_property("answer", 42));
        assert_eq!(object.property("answer"), Value::from(42));
        assert!(!Object::new(()).set_property("answer", 42));
    }

    #[test]
    fn test_carrier_points_back() {
        let target = Object::plain();
        let carrier = Object::carrier(Some(target.clone()));
        assert!(carrier.is_carrier());
        assert_eq!(carrier.property("object"), Value::from(&target));
        assert_eq!(Object::carrier(None).property("object"), Value::Undefined);
    }

    #[test]
    fn test_weak_does_not_keep_alive() {
        let object = Object::plain();
        let weak = object.downgrade();
        assert!(weak.is(&object));
        assert_eq!(weak.upgrade(), Some(object.clone()));

        drop(object);
        assert!(weak.upgrade().is_none());
    }
}
