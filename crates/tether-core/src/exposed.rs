//! Marks values as safe to surface across the API boundary.
//!
//! Objects are exposed through their [`Resource`](crate::resource::Resource),
//! so exposure is set at most once per object. Errors carry their exposure
//! inline (see [`Error::expose`](crate::Error::expose)).
//!
//! ```rust,ignore
//! let user = Object::with_fields([("name", "ada"), ("password", "hunter2")]);
//! exposed::properties(&user, ["name"])?;
//! assert_eq!(user_json, json!({ "name": "ada" }));
//! ```

use crate::error::Result;
use crate::object::Object;
use crate::resource::{self, Resource};
use crate::value::Value;

/// How a value presents itself to remote callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Exposure {
    /// The value is exposed as itself.
    Itself,
    /// The value is exposed as another value.
    Value(Value),
    /// Only the listed properties are exposed, as `(property, exposed name)`.
    Properties(Vec<(String, String)>),
}

impl Exposure {
    /// Computes the exposed value of `object`.
    pub fn project(&self, object: &Object) -> Value {
        match self {
            Exposure::Itself => Value::from(object),
            Exposure::Value(value) => value.clone(),
            Exposure::Properties(pairs) => Value::Map(
                pairs
                    .iter()
                    .map(|(key, name)| (name.clone(), object.property(key)))
                    .collect(),
            ),
        }
    }
}

/// Exposes `object` as itself.
pub fn expose(object: &Object) -> Result<Object> {
    resource::attach(&Value::from(object), Resource::exposing(Exposure::Itself))
}

/// Exposes `object` as `value`.
pub fn expose_as(object: &Object, value: impl Into<Value>) -> Result<Object> {
    resource::attach(
        &Value::from(object),
        Resource::exposing(Exposure::Value(value.into())),
    )
}

/// Exposes only the named properties of `object`.
pub fn properties<I, S>(object: &Object, names: I) -> Result<Object>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let pairs = names
        .into_iter()
        .map(|name| {
            let name = name.into();
            (name.clone(), name)
        })
        .collect();
    resource::attach(
        &Value::from(object),
        Resource::exposing(Exposure::Properties(pairs)),
    )
}

/// Exposes the given properties of `object` under new names, as
/// `(property, exposed name)` pairs.
pub fn renamed<I, K, N>(object: &Object, pairs: I) -> Result<Object>
where
    I: IntoIterator<Item = (K, N)>,
    K: Into<String>,
    N: Into<String>,
{
    let pairs = pairs
        .into_iter()
        .map(|(key, name)| (key.into(), name.into()))
        .collect();
    resource::attach(
        &Value::from(object),
        Resource::exposing(Exposure::Properties(pairs)),
    )
}

/// Returns `true` for exposed objects and exposed errors.
pub fn is_exposed(value: &Value) -> bool {
    match value {
        Value::Object(object) => exposure(object).is_some(),
        Value::Error(error) => error.is_exposed(),
        _ => false,
    }
}

/// Returns the value `value` is exposed as, if it is exposed.
pub fn exposed_value(value: &Value) -> Option<Value> {
    match value {
        Value::Object(object) => exposure(object).map(|exposure| exposure.project(object)),
        Value::Error(error) => error.exposed_value(),
        _ => None,
    }
}

pub(crate) fn exposure(object: &Object) -> Option<Exposure> {
    resource::get(&Value::from(object)).expose
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_expose_object() {
        let object = Object::with_fields([("a", 1)]);
        assert!(!is_exposed(&Value::from(&object)));

        expose(&object).unwrap();
        assert!(is_exposed(&Value::from(&object)));
        assert_eq!(exposed_value(&Value::from(&object)), Some(Value::from(&object)));
        assert_eq!(
            Value::from(&object).to_json().unwrap(),
            serde_json::json!({ "a": 1 })
        );

        assert!(expose(&object).is_err());
    }

    #[test]
    fn test_expose_as() {
        let object = Object::plain();
        expose_as(&object, "visible").unwrap();
        assert_eq!(exposed_value(&Value::from(&object)), Some(Value::from("visible")));
    }

    #[test]
    fn test_properties() {
        let object = Object::with_fields([("name", "ada"), ("password", "hunter2")]);
        properties(&object, ["name"]).unwrap();

        let json = Value::from(&object).to_json().unwrap();
        assert_eq!(json, serde_json::json!({ "name": "ada" }));

        object.set_property("name", "grace");
        let json = Value::from(&object).to_json().unwrap();
        assert_eq!(json, serde_json::json!({ "name": "grace" }));
    }

    #[test]
    fn test_renamed() {
        let object = Object::with_fields([("internal_id", 7)]);
        renamed(&object, [("internal_id", "id")]).unwrap();
        assert_eq!(
            Value::from(&object).to_json().unwrap(),
            serde_json::json!({ "id": 7 })
        );
    }

    #[test]
    fn test_errors_and_primitives() {
        assert!(is_exposed(&Value::from(Error::exposed("visible"))));
        assert!(!is_exposed(&Value::from(Error::message("hidden"))));
        assert!(!is_exposed(&Value::from("text")));
        assert_eq!(exposed_value(&Value::from(1)), None);
    }
}
