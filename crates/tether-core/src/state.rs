//! Immutable per-step request context.
//!
//! Every `route` and `close` step builds a fresh [`State`] and hands it to the
//! handler as an explicit argument. A state never changes after construction;
//! [`State::with_value`] returns a new state that shares all other fields.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::binding::Binding;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{Path, Value};

/// The kind of request step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Route,
    Close,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Route => "route",
            StepKind::Close => "close",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "route" => Ok(StepKind::Route),
            "close" => Ok(StepKind::Close),
            other => Err(Error::message(format!("unknown step kind '{other}'"))),
        }
    }
}

// =============================================================================
// Value descriptors
// =============================================================================

type Getter = Arc<dyn Fn() -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(Value) + Send + Sync>;

/// Replacement value for [`State::with_value`]: either a plain value or an
/// accessor pair evaluated on every read.
#[derive(Clone)]
pub enum ValueDescriptor {
    Value(Value),
    Accessor { get: Getter, set: Option<Setter> },
}

impl ValueDescriptor {
    /// An accessor without a setter.
    pub fn getter<F>(get: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Accessor {
            get: Arc::new(get),
            set: None,
        }
    }

    /// An accessor with both a getter and a setter.
    pub fn accessor<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> Value + Send + Sync + 'static,
        S: Fn(Value) + Send + Sync + 'static,
    {
        Self::Accessor {
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }
    }

    fn get(&self) -> Value {
        match self {
            ValueDescriptor::Value(value) => value.clone(),
            ValueDescriptor::Accessor { get, .. } => get(),
        }
    }
}

impl From<Value> for ValueDescriptor {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDescriptor::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ValueDescriptor::Accessor { set, .. } => f
                .debug_struct("Accessor")
                .field("settable", &set.is_some())
                .finish(),
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Context of one `route` or `close` step.
#[derive(Clone)]
pub struct State(Arc<StateInner>);

struct StateInner {
    value: ValueDescriptor,
    path: Path,
    kind: StepKind,
    origin: Value,
    binding: Arc<Binding>,
    modified: bool,
}

impl State {
    /// Builds the context for a step on `value`.
    ///
    /// Fails with `InvalidBinding` unless `binding` is the binding whose
    /// target is `value`.
    pub fn new(
        value: Value,
        path: Path,
        kind: StepKind,
        origin: Value,
        binding: Arc<Binding>,
    ) -> Result<Self> {
        if !binding.targets(&value) {
            return Err(ErrorKind::InvalidBinding.into());
        }

        Ok(Self(Arc::new(StateInner {
            value: ValueDescriptor::Value(value),
            path,
            kind,
            origin,
            binding,
            modified: false,
        })))
    }

    /// The value currently being addressed.
    pub fn value(&self) -> Value {
        self.0.value.get()
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub fn kind(&self) -> StepKind {
        self.0.kind
    }

    pub fn origin(&self) -> &Value {
        &self.0.origin
    }

    pub fn binding(&self) -> &Arc<Binding> {
        &self.0.binding
    }

    /// Returns `true` for states produced by [`State::with_value`].
    pub fn is_modified(&self) -> bool {
        self.0.modified
    }

    /// Returns a new state with its value replaced by `descriptor`.
    ///
    /// The receiver is left untouched.
    pub fn with_value(&self, descriptor: impl Into<ValueDescriptor>) -> State {
        Self(Arc::new(StateInner {
            value: descriptor.into(),
            path: self.0.path.clone(),
            kind: self.0.kind,
            origin: self.0.origin.clone(),
            binding: Arc::clone(&self.0.binding),
            modified: true,
        }))
    }

    /// Writes through the value's setter. Returns `false` when the value is
    /// not a settable accessor.
    pub fn store(&self, value: impl Into<Value>) -> bool {
        match &self.0.value {
            ValueDescriptor::Accessor { set: Some(set), .. } => {
                set(value.into());
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value(), f)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("value", &self.0.value)
            .field("path", &self.0.path)
            .field("kind", &self.0.kind)
            .field("origin", &self.0.origin)
            .field("modified", &self.0.modified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingKind, get_binding};
    use crate::handler::{Handler, Handlers};
    use crate::object::Object;
    use parking_lot::Mutex;

    fn bound() -> (Object, Arc<Binding>) {
        let handlers = Handlers::new()
            .router(Handler::noop())
            .closer(Handler::noop());
        let object = Binding::bind(Value::from(Object::plain()), handlers, BindingKind::Normal)
            .unwrap();
        let binding = get_binding(&Value::from(&object)).unwrap();
        (object, binding)
    }

    #[test]
    fn test_new_copies_fields() {
        let (object, binding) = bound();
        let path = Path::from(vec![Value::from("a")]);
        let origin = Value::from(Object::plain());

        let state = State::new(
            Value::from(&object),
            path.clone(),
            StepKind::Route,
            origin.clone(),
            binding.clone(),
        )
        .unwrap();

        assert_eq!(state.value(), Value::from(&object));
        assert_eq!(state.path(), &path);
        assert_eq!(state.kind(), StepKind::Route);
        assert_eq!(state.origin(), &origin);
        assert!(Arc::ptr_eq(state.binding(), &binding));
        assert!(!state.is_modified());
    }

    #[test]
    fn test_rejects_foreign_binding() {
        let (_object, binding) = bound();
        let err = State::new(
            Value::from(Object::plain()),
            Path::new(),
            StepKind::Close,
            Value::Undefined,
            binding,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidBinding));
    }

    #[test]
    fn test_with_value_leaves_receiver_untouched() {
        let (object, binding) = bound();
        let state = State::new(
            Value::from(&object),
            Path::new(),
            StepKind::Close,
            Value::Undefined,
            binding,
        )
        .unwrap();

        let replaced = state.with_value(Value::from(42));
        assert_eq!(replaced.value(), Value::from(42));
        assert!(replaced.is_modified());
        assert_eq!(replaced.kind(), StepKind::Close);
        assert!(Arc::ptr_eq(replaced.binding(), state.binding()));

        assert_eq!(state.value(), Value::from(&object));
        assert!(!state.is_modified());
        assert!(!state.store(1));
    }

    #[test]
    fn test_accessor_descriptor() {
        let (object, binding) = bound();
        let state = State::new(
            Value::from(&object),
            Path::new(),
            StepKind::Route,
            Value::Undefined,
            binding,
        )
        .unwrap();

        let cell = Arc::new(Mutex::new(Value::from(1)));
        let (read, write) = (cell.clone(), cell.clone());
        let replaced = state.with_value(ValueDescriptor::accessor(
            move || read.lock().clone(),
            move |value| *write.lock() = value,
        ));

        assert_eq!(replaced.value(), Value::from(1));
        assert!(replaced.store(2));
        assert_eq!(replaced.value(), Value::from(2));
        assert_eq!(replaced.to_string(), "2");

        let read_only = state.with_value(ValueDescriptor::getter(|| Value::from("x")));
        assert!(!read_only.store(3));
    }

    #[test]
    fn test_step_kind_parse() {
        assert_eq!("route".parse::<StepKind>().unwrap(), StepKind::Route);
        assert_eq!("close".parse::<StepKind>().unwrap(), StepKind::Close);
        assert!("other".parse::<StepKind>().is_err());
    }
}
