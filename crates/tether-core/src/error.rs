//! Error types shared by every tether crate.
//!
//! An [`Error`] is an [`ErrorKind`] plus two optional annotations:
//!
//! - a [`Trace`] recording the step (`route` or `close`), the path and, for
//!   close steps, the data that failed. Path-builders attach it exactly once;
//!   an error that re-enters a chain keeps its first trace.
//! - an [`Exposure`] marking the error as safe to surface to remote callers.
//!
//! Registry misuse (`InvalidTargetKind`, `MissingHandlers`, `AlreadyBound`,
//! ...) is returned synchronously. Everything raised while routing or closing
//! surfaces from the returned futures.

use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use crate::exposed::Exposure;
use crate::state::StepKind;
use crate::value::{Path, Value};

/// Result alias used throughout tether.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// =============================================================================
// Error Kinds
// =============================================================================

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// Only objects (or null) can be bound.
    #[error("only objects can be bound, got '{0}'")]
    InvalidTargetKind(String),

    /// A router or closer was missing and could not be copied.
    #[error("bindings require a router and a closer or another binding to copy")]
    MissingHandlers,

    /// A normal binding was requested for an object that is already bound.
    #[error("object '{0}' is already bound")]
    AlreadyBound(String),

    /// An unknown binding kind identifier.
    #[error("binding kind '{0}' is invalid")]
    InvalidBindingKind(String),

    /// Api origins have to be objects or maps.
    #[error("api origin has to be an object, got '{0}'")]
    InvalidOrigin(String),

    /// A protocol could not be turned into a client.
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    /// Routing reached a value without a binding.
    #[error("Object at position '{0}' is not exposed.")]
    NotExposed(Path),

    /// A path was built from something other than a list.
    #[error("state path has to be a list")]
    InvalidPath,

    /// A request state was built with a binding that does not belong to its value.
    #[error("state binding does not belong to the addressed value")]
    InvalidBinding,

    /// Resource data can only be attached once, and only to objects.
    #[error("could not transform given value into a resource")]
    InvalidResource,

    /// The bound target was dropped while a request was in flight.
    #[error("bound target has been dropped")]
    TargetDropped,

    /// A remote call did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The protocol lost its connection.
    #[error("protocol is disconnected")]
    Disconnected,

    /// A value could not be encoded or decoded for a transport.
    #[error("codec error: {0}")]
    Codec(String),

    /// A plain error message.
    #[error("{0}")]
    Message(String),

    /// An arbitrary value raised by a handler.
    #[error("{0}")]
    Thrown(Value),
}

impl ErrorKind {
    /// Stable name of the kind, used in transport projections.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTargetKind(_) => "InvalidTargetKind",
            ErrorKind::MissingHandlers => "MissingHandlers",
            ErrorKind::AlreadyBound(_) => "AlreadyBound",
            ErrorKind::InvalidBindingKind(_) => "InvalidBindingKind",
            ErrorKind::InvalidOrigin(_) => "InvalidOrigin",
            ErrorKind::InvalidProtocol(_) => "InvalidProtocol",
            ErrorKind::NotExposed(_) => "NotExposed",
            ErrorKind::InvalidPath => "InvalidPath",
            ErrorKind::InvalidBinding => "InvalidBinding",
            ErrorKind::InvalidResource => "InvalidResource",
            ErrorKind::TargetDropped => "TargetDropped",
            ErrorKind::Timeout(_) => "Timeout",
            ErrorKind::Disconnected => "Disconnected",
            ErrorKind::Codec(_) => "Codec",
            ErrorKind::Message(_) => "Message",
            ErrorKind::Thrown(_) => "Thrown",
        }
    }
}

/// Where a request failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub kind: StepKind,
    pub path: Path,
    /// The close data. Always `None` for route failures.
    pub data: Option<Value>,
}

// =============================================================================
// Error
// =============================================================================

/// The error type of tether operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    trace: Option<Trace>,
    exposure: Option<Exposure>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            trace: None,
            exposure: None,
        }
    }

    /// Creates an error from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message(message.into()))
    }

    /// Creates an exposed error from a plain message.
    pub fn exposed(message: impl Into<String>) -> Self {
        Self::message(message).expose()
    }

    /// Wraps a raised value. Errors carried as values are unwrapped.
    pub fn thrown(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Error(error) => *error,
            value => Self::new(ErrorKind::Thrown(value)),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// Returns `true` once a path-builder has attached a trace.
    pub fn is_tagged(&self) -> bool {
        self.trace.is_some()
    }

    /// Attaches a trace unless one is already present.
    pub fn tag(mut self, kind: StepKind, path: &Path, data: Option<Value>) -> Self {
        if self.trace.is_none() {
            trace!(step = %kind, path = %path, error = %self.kind, "Tagging failed step");
            self.trace = Some(Trace {
                kind,
                path: path.clone(),
                data,
            });
        }
        self
    }

    /// Exposes the error as itself.
    pub fn expose(mut self) -> Self {
        self.exposure = Some(Exposure::Itself);
        self
    }

    /// Exposes the error as `value`.
    pub fn expose_as(mut self, value: impl Into<Value>) -> Self {
        self.exposure = Some(Exposure::Value(value.into()));
        self
    }

    pub fn is_exposed(&self) -> bool {
        self.exposure.is_some()
    }

    /// The value remote callers may see, if the error is exposed.
    pub fn exposed_value(&self) -> Option<Value> {
        match self.exposure.as_ref()? {
            Exposure::Itself => Some(Value::from(self.clone())),
            Exposure::Value(value) => Some(value.clone()),
            Exposure::Properties(pairs) => Some(Value::Map(
                pairs
                    .iter()
                    .map(|(key, name)| (name.clone(), self.property(key)))
                    .collect(),
            )),
        }
    }

    /// Reads one of the error's enumerable properties.
    fn property(&self, key: &str) -> Value {
        match key {
            "message" => Value::from(self.kind.to_string()),
            "kind" => Value::from(self.kind.name()),
            "type" => self.trace.as_ref().map(|t| t.kind.as_str()).into(),
            "route" => self.trace.as_ref().map(|t| t.path.clone()).into(),
            "data" => self.trace.as_ref().and_then(|t| t.data.clone()).into(),
            _ => Value::Undefined,
        }
    }

    /// Projects the error into the form transports send to callers.
    ///
    /// Unexposed errors collapse into a generic internal error so that no
    /// server-side detail leaks.
    pub fn to_exposed_json(&self) -> serde_json::Value {
        let projected = match self.exposure.as_ref() {
            None => None,
            Some(Exposure::Itself) => Some(self.describe()),
            Some(_) => self
                .exposed_value()
                .and_then(|value| value.to_json().ok())
                .map(|value| serde_json::json!({ "value": value })),
        };
        projected.unwrap_or_else(|| {
            serde_json::json!({ "kind": "Internal", "message": "Internal error." })
        })
    }

    fn describe(&self) -> serde_json::Value {
        let mut json = serde_json::Map::new();
        json.insert("kind".into(), self.kind.name().into());
        json.insert("message".into(), self.kind.to_string().into());
        if let Some(trace) = &self.trace {
            json.insert("type".into(), trace.kind.as_str().into());
            json.insert(
                "route".into(),
                trace.path.to_json().unwrap_or(serde_json::Value::Null),
            );
            if let Some(data) = &trace.data {
                json.insert(
                    "data".into(),
                    data.to_json().unwrap_or(serde_json::Value::Null),
                );
            }
        }
        serde_json::Value::Object(json)
    }

    /// Rebuilds an exposed error from its transport projection.
    pub fn from_exposed_json(json: serde_json::Value) -> Self {
        let mut map = match json {
            serde_json::Value::Object(map) => map,
            other => return Self::thrown(Value::from(other)).expose(),
        };

        if let Some(value) = map.remove("value") {
            return Self::thrown(Value::from(value)).expose();
        }

        let message = map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Unknown error.")
            .to_owned();
        let mut error = Self::message(message).expose();

        let kind = map
            .get("type")
            .and_then(serde_json::Value::as_str)
            .and_then(|kind| kind.parse::<StepKind>().ok());
        let path = map.remove("route").map(Value::from).map(Path::try_from);
        if let (Some(kind), Some(Ok(path))) = (kind, path) {
            let data = map.remove("data").map(Value::from);
            error = error.tag(kind, &path, data);
        }
        error
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<Value> for Error {
    fn from(value: Value) -> Self {
        Self::thrown(value)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Codec(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Symbol;

    #[test]
    fn test_not_exposed_message() {
        let path = Path::from(vec![Value::from("x"), Value::from(Symbol::new("test"))]);
        let err = Error::new(ErrorKind::NotExposed(path)).expose();
        assert_eq!(
            err.to_string(),
            "Object at position 'x/Symbol(test)' is not exposed."
        );
        assert!(err.is_exposed());
    }

    #[test]
    fn test_first_tag_wins() {
        let first = Path::from(vec![Value::from("a")]);
        let second = Path::from(vec![Value::from("b")]);

        let err = Error::message("boom")
            .tag(StepKind::Route, &first, None)
            .tag(StepKind::Close, &second, Some(Value::from(1)));

        let trace = err.trace().unwrap();
        assert_eq!(trace.kind, StepKind::Route);
        assert_eq!(trace.path, first);
        assert_eq!(trace.data, None);
    }

    #[test]
    fn test_thrown_unwraps_errors() {
        let inner = Error::message("inner");
        assert_eq!(Error::thrown(Value::from(inner.clone())), inner);

        let err = Error::thrown("plain");
        assert!(matches!(err.kind(), ErrorKind::Thrown(Value::String(s)) if s == "plain"));
    }

    #[test]
    fn test_unexposed_projection_hides_details() {
        let json = Error::message("secret").to_exposed_json();
        assert_eq!(json["kind"], "Internal");
        assert!(!json.to_string().contains("secret"));
    }

    #[test]
    fn test_exposed_projection_round_trip() {
        let path = Path::from(vec![Value::from("a")]);
        let err = Error::exposed("nope").tag(StepKind::Close, &path, Some(Value::from("missing")));

        let rebuilt = Error::from_exposed_json(err.to_exposed_json());
        assert_eq!(rebuilt.to_string(), "nope");
        assert!(rebuilt.is_exposed());

        let trace = rebuilt.trace().unwrap();
        assert_eq!(trace.kind, StepKind::Close);
        assert_eq!(trace.path, path);
        assert_eq!(trace.data, Some(Value::from("missing")));
    }

    #[test]
    fn test_expose_as_value() {
        let err = Error::message("secret").expose_as("public");
        assert_eq!(err.exposed_value(), Some(Value::from("public")));
        assert_eq!(err.to_exposed_json()["value"], "public");
    }
}
