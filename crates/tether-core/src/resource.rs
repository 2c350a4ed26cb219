//! Out-of-band metadata attached to objects.
//!
//! A [`Resource`] is set at most once per object and lives exactly as long
//! as the object does. It is independent of binding state; the exposure
//! helper stores its marker here.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ErrorKind, Result};
use crate::exposed::Exposure;
use crate::object::{Object, ObjectId};
use crate::value::Value;

static RESOURCES: LazyLock<Mutex<HashMap<ObjectId, Resource>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Metadata record of an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    /// How the object is presented to remote callers, if at all.
    pub expose: Option<Exposure>,
    /// Free-form metadata such as a content type.
    pub data: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exposing(exposure: Exposure) -> Self {
        Self {
            expose: Some(exposure),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Value {
        self.data.get(key).cloned().unwrap_or_default()
    }
}

/// Attaches `resource` to `target` and returns the object.
///
/// Fails with `InvalidResource` if `target` is not an object or already
/// carries a resource.
pub fn attach(target: &Value, resource: Resource) -> Result<Object> {
    let Value::Object(object) = target else {
        return Err(ErrorKind::InvalidResource.into());
    };

    let mut resources = RESOURCES.lock();
    if resources.contains_key(&object.id()) {
        return Err(ErrorKind::InvalidResource.into());
    }
    resources.insert(object.id(), resource);
    debug!(object = %object.id(), "Attached resource");

    Ok(object.clone())
}

/// Returns the resource of `value`, or an empty one.
pub fn get(value: &Value) -> Resource {
    match value {
        Value::Object(object) => RESOURCES
            .lock()
            .get(&object.id())
            .cloned()
            .unwrap_or_default(),
        _ => Resource::default(),
    }
}

pub(crate) fn release(id: ObjectId) {
    let removed = RESOURCES.lock().remove(&id);
    drop(removed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_once() {
        let object = Value::from(Object::plain());
        let resource = Resource::new().with("contentType", "text/plain");

        let attached = attach(&object, resource.clone()).unwrap();
        assert_eq!(Value::from(attached), object);
        assert_eq!(get(&object), resource);
        assert_eq!(get(&object).get("contentType"), Value::from("text/plain"));

        let err = attach(&object, Resource::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidResource));
    }

    #[test]
    fn test_primitives_have_no_resource() {
        assert!(attach(&Value::from("x"), Resource::new()).is_err());
        assert_eq!(get(&Value::from(1)), Resource::default());
        assert_eq!(get(&Value::from(Object::plain())), Resource::default());
    }

    #[test]
    fn test_released_with_object() {
        let object = Object::plain();
        let id = object.id();
        attach(&Value::from(&object), Resource::new()).unwrap();
        assert!(RESOURCES.lock().contains_key(&id));

        drop(object);
        assert!(!RESOURCES.lock().contains_key(&id));
    }
}
