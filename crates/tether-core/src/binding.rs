//! The association registry.
//!
//! A [`Binding`] ties an object to a router, a closer and a [`BindingKind`].
//! Bindings live in a process-wide side table keyed by [`ObjectId`]; the
//! table never keeps its keys alive. An entry disappears on [`unbind`] or as
//! soon as the last handle to the bound object is dropped.
//!
//! # Binding kinds
//!
//! - [`BindingKind::Normal`] refuses objects that are already bound.
//! - [`BindingKind::Rebind`] replaces any previous binding.
//! - [`BindingKind::Clone`] never touches the target. It allocates a fresh
//!   carrier object, binds the carrier, and wraps the router so that routing
//!   back to the original target yields the carrier instead.
//!
//! ```rust,ignore
//! let root = Binding::bind(Value::Null, handlers, BindingKind::Normal)?;
//! let copy = Binding::bind(Value::from(&root), Handlers::new(), BindingKind::Clone)?;
//! assert_ne!(root, copy);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{Instrument, debug, debug_span, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::handler::{Handler, Handlers};
use crate::object::{Object, ObjectId, WeakObject};
use crate::state::{State, StepKind};
use crate::value::{Path, Value};

static BINDINGS: LazyLock<Mutex<HashMap<ObjectId, Arc<Binding>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

// =============================================================================
// Binding kinds
// =============================================================================

/// How [`Binding::bind`] treats an already-bound target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BindingKind {
    #[default]
    Normal,
    Clone,
    Rebind,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Normal => "normal",
            BindingKind::Clone => "clone",
            BindingKind::Rebind => "rebind",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(BindingKind::Normal),
            "clone" => Ok(BindingKind::Clone),
            "rebind" => Ok(BindingKind::Rebind),
            other => Err(ErrorKind::InvalidBindingKind(other.to_owned()).into()),
        }
    }
}

/// `true` requests a clone, `false` a normal binding.
impl From<bool> for BindingKind {
    fn from(clone: bool) -> Self {
        if clone {
            BindingKind::Clone
        } else {
            BindingKind::Normal
        }
    }
}

/// Anything accepted where a binding kind is expected.
pub trait IntoBindingKind {
    fn into_binding_kind(self) -> Result<BindingKind>;
}

impl IntoBindingKind for BindingKind {
    fn into_binding_kind(self) -> Result<BindingKind> {
        Ok(self)
    }
}

impl IntoBindingKind for bool {
    fn into_binding_kind(self) -> Result<BindingKind> {
        Ok(self.into())
    }
}

impl IntoBindingKind for &str {
    fn into_binding_kind(self) -> Result<BindingKind> {
        self.parse()
    }
}

impl IntoBindingKind for String {
    fn into_binding_kind(self) -> Result<BindingKind> {
        self.parse()
    }
}

/// `None` selects the default kind.
impl<K: IntoBindingKind> IntoBindingKind for Option<K> {
    fn into_binding_kind(self) -> Result<BindingKind> {
        self.map_or(Ok(BindingKind::default()), IntoBindingKind::into_binding_kind)
    }
}

// =============================================================================
// Router
// =============================================================================

/// The router of a binding.
#[derive(Debug, Clone)]
pub enum Router {
    /// Results are returned as produced.
    Direct(Handler),
    /// Results identical to `original` are replaced by `carrier`.
    Substituting {
        delegate: Handler,
        original: Option<WeakObject>,
        carrier: WeakObject,
    },
}

impl Router {
    /// The user-supplied handler, with any substitution removed.
    pub fn delegate(&self) -> &Handler {
        match self {
            Router::Direct(handler) => handler,
            Router::Substituting { delegate, .. } => delegate,
        }
    }

    pub fn is_substituting(&self) -> bool {
        matches!(self, Router::Substituting { .. })
    }

    pub fn call(&self, state: State, destination: Value) -> BoxFuture<'static, Result<Value>> {
        match self {
            Router::Direct(handler) => handler.call(state, destination),
            Router::Substituting {
                delegate,
                original,
                carrier,
            } => {
                let original = original.clone();
                let carrier = carrier.clone();
                delegate
                    .call(state, destination)
                    .map(move |result| {
                        Ok(match (result?, original) {
                            (Value::Object(object), Some(original)) if original.is(&object) => {
                                carrier.upgrade().map(Value::Object).unwrap_or(Value::Object(object))
                            }
                            (value, _) => value,
                        })
                    })
                    .boxed()
            }
        }
    }
}

// =============================================================================
// Binding
// =============================================================================

/// Router, closer and kind associated with one addressable object.
pub struct Binding {
    target: Option<WeakObject>,
    carrier: Option<WeakObject>,
    router: Router,
    closer: Handler,
    kind: BindingKind,
}

impl Binding {
    /// Binds `target` and returns the addressable handle.
    ///
    /// `target` must be an object, or `Null` to have a fresh carrier
    /// allocated. The handle is the carrier for `Clone` and `Null` bindings
    /// and `target` itself otherwise.
    ///
    /// Handlers reach the target through [`State::value`]. A handler that
    /// captures the bound object keeps it alive through the registry, and
    /// the binding is then never released.
    pub fn bind(target: Value, handlers: Handlers, kind: BindingKind) -> Result<Object> {
        let original = match target {
            Value::Null => None,
            Value::Object(object) => Some(object),
            other => return Err(ErrorKind::InvalidTargetKind(other.to_string()).into()),
        };

        let existing = original.as_ref().and_then(|object| lookup(object.id()));
        if kind == BindingKind::Normal && existing.is_some() {
            return Err(already_bound(original.as_ref()));
        }

        let Handlers { router, closer } = handlers;
        let (router, closer) = match (router, closer, &existing) {
            (Some(router), Some(closer), _) => (router, closer),
            (router, closer, Some(existing)) if kind == BindingKind::Clone => (
                router.unwrap_or_else(|| existing.router.delegate().clone()),
                closer.unwrap_or_else(|| existing.closer.clone()),
            ),
            _ => return Err(ErrorKind::MissingHandlers.into()),
        };
        drop(existing);

        let carrier = (original.is_none() || kind == BindingKind::Clone)
            .then(|| Object::carrier(original.clone()));
        let router = match &carrier {
            Some(carrier) if kind == BindingKind::Clone => Router::Substituting {
                delegate: router,
                original: original.as_ref().map(Object::downgrade),
                carrier: carrier.downgrade(),
            },
            _ => Router::Direct(router),
        };

        let Some(handle) = carrier.clone().or_else(|| original.clone()) else {
            return Err(ErrorKind::InvalidTargetKind("null".into()).into());
        };

        let binding = Arc::new(Binding {
            target: original.as_ref().map(Object::downgrade),
            carrier: carrier.as_ref().map(Object::downgrade),
            router,
            closer,
            kind,
        });

        let replaced = {
            let mut bindings = BINDINGS.lock();
            if kind == BindingKind::Normal && bindings.contains_key(&handle.id()) {
                return Err(already_bound(Some(&handle)));
            }
            bindings.insert(handle.id(), binding)
        };
        drop(replaced);

        debug!(handle = %handle.id(), kind = %kind, "Bound object");
        Ok(handle)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn closer(&self) -> &Handler {
        &self.closer
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// The logical target: the original object, or `Null` for bindings of
    /// null. Fails with `TargetDropped` once the original is gone.
    pub fn target(&self) -> Result<Value> {
        match &self.target {
            None => Ok(Value::Null),
            Some(target) => target
                .upgrade()
                .map(Value::Object)
                .ok_or_else(|| ErrorKind::TargetDropped.into()),
        }
    }

    /// The clone carrier, for `Clone` bindings and bindings of null.
    pub fn carrier(&self) -> Option<Object> {
        self.carrier.as_ref().and_then(WeakObject::upgrade)
    }

    /// Returns `true` if `value` is this binding's logical target.
    pub fn targets(&self, value: &Value) -> bool {
        match (&self.target, value) {
            (None, Value::Null) => true,
            (Some(target), Value::Object(object)) => target.is(object),
            _ => false,
        }
    }

    /// Invokes the router under a fresh route state.
    pub fn route(
        self: &Arc<Self>,
        path: &Path,
        origin: &Value,
        destination: Value,
    ) -> BoxFuture<'static, Result<Value>> {
        self.traverse(StepKind::Route, path, origin, destination)
    }

    /// Invokes the closer under a fresh close state.
    pub fn close(
        self: &Arc<Self>,
        path: &Path,
        origin: &Value,
        data: Value,
    ) -> BoxFuture<'static, Result<Value>> {
        self.traverse(StepKind::Close, path, origin, data)
    }

    fn traverse(
        self: &Arc<Self>,
        kind: StepKind,
        path: &Path,
        origin: &Value,
        input: Value,
    ) -> BoxFuture<'static, Result<Value>> {
        let binding = Arc::clone(self);
        let span = debug_span!("step", kind = %kind, path = %path);
        let path = path.clone();
        let origin = origin.clone();

        async move {
            let state = State::new(binding.target()?, path, kind, origin, Arc::clone(&binding))?;
            trace!(input = %input, "Invoking handler");
            match kind {
                StepKind::Route => binding.router.call(state, input).await,
                StepKind::Close => binding.closer.call(state, input).await,
            }
        }
        .instrument(span)
        .boxed()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("target", &self.target)
            .field("carrier", &self.carrier)
            .field("router", &self.router)
            .field("closer", &self.closer)
            .field("kind", &self.kind)
            .finish()
    }
}

fn already_bound(object: Option<&Object>) -> Error {
    let name = object.map_or_else(|| "null".to_owned(), |object| object.id().to_string());
    ErrorKind::AlreadyBound(name).into()
}

fn lookup(id: ObjectId) -> Option<Arc<Binding>> {
    BINDINGS.lock().get(&id).cloned()
}

// =============================================================================
// Registry queries
// =============================================================================

/// Returns `true` if `value` is an object with an active binding.
pub fn is_bound(value: &Value) -> bool {
    match value {
        Value::Object(object) => BINDINGS.lock().contains_key(&object.id()),
        _ => false,
    }
}

/// Looks up the binding of `value`.
pub fn get_binding(value: &Value) -> Option<Arc<Binding>> {
    let binding = value.as_object().and_then(|object| lookup(object.id()));
    trace!(value = %value, found = binding.is_some(), "Binding lookup");
    binding
}

/// Removes the binding of `value`, if any, and returns `value` unchanged.
pub fn unbind(value: Value) -> Value {
    if let Value::Object(object) = &value {
        let removed = BINDINGS.lock().remove(&object.id());
        if removed.is_some() {
            debug!(handle = %object.id(), "Unbound object");
        }
        drop(removed);
    }
    value
}

pub(crate) fn release(id: ObjectId) {
    let removed = BINDINGS.lock().remove(&id);
    drop(removed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handlers() -> (Handler, Handler, Handlers) {
        let router = Handler::noop();
        let closer = Handler::noop();
        let handlers = Handlers::new().router(router.clone()).closer(closer.clone());
        (router, closer, handlers)
    }

    #[test]
    fn test_bind_object() {
        let (router, closer, handlers) = handlers();
        let object = Object::plain();

        let handle = Binding::bind(Value::from(&object), handlers, BindingKind::Normal).unwrap();
        assert_eq!(handle, object);
        assert!(is_bound(&Value::from(&object)));

        let binding = get_binding(&Value::from(&object)).unwrap();
        assert!(binding.router().delegate().ptr_eq(&router));
        assert!(binding.closer().ptr_eq(&closer));
        assert_eq!(binding.kind(), BindingKind::Normal);
        assert_eq!(binding.target().unwrap(), Value::from(&object));
        assert!(binding.carrier().is_none());
    }

    #[test]
    fn test_bind_null_allocates_carrier() {
        let (_, _, handlers) = handlers();
        let handle = Binding::bind(Value::Null, handlers, BindingKind::Normal).unwrap();

        let binding = get_binding(&Value::from(&handle)).unwrap();
        assert_eq!(binding.target().unwrap(), Value::Null);
        assert_eq!(binding.carrier(), Some(handle));
        assert!(!binding.router().is_substituting());
    }

    #[test]
    fn test_bind_primitive_fails() {
        let (_, _, handlers) = handlers();
        let err = Binding::bind(Value::from("text"), handlers, BindingKind::Normal).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidTargetKind(s) if s == "text"));
    }

    #[test]
    fn test_missing_handlers() {
        let object = Value::from(Object::plain());
        let err = Binding::bind(object.clone(), Handlers::new(), BindingKind::Normal).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingHandlers));

        let only_router = Handlers::new().router(Handler::noop());
        let err = Binding::bind(object.clone(), only_router, BindingKind::Rebind).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingHandlers));
        assert!(!is_bound(&object));
    }

    #[test]
    fn test_normal_refuses_bound_objects() {
        let object = Value::from(Object::plain());
        Binding::bind(object.clone(), handlers().2, BindingKind::Normal).unwrap();

        let err = Binding::bind(object.clone(), handlers().2, BindingKind::Normal).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyBound(_)));
    }

    #[test]
    fn test_rebind_replaces() {
        let object = Value::from(Object::plain());
        Binding::bind(object.clone(), handlers().2, BindingKind::Normal).unwrap();

        let (router, closer, replacement) = handlers();
        Binding::bind(object.clone(), replacement, BindingKind::Rebind).unwrap();

        let binding = get_binding(&object).unwrap();
        assert!(binding.router().delegate().ptr_eq(&router));
        assert!(binding.closer().ptr_eq(&closer));
        assert_eq!(binding.kind(), BindingKind::Rebind);
    }

    #[test]
    fn test_binding_copy_shortcut() {
        let source = Value::from(Object::plain());
        let (router, closer, handlers) = handlers();
        Binding::bind(source.clone(), handlers, BindingKind::Normal).unwrap();

        let copy = Value::from(Object::plain());
        let binding = get_binding(&source).unwrap();
        Binding::bind(copy.clone(), Handlers::from(&binding), BindingKind::Normal).unwrap();

        let copied = get_binding(&copy).unwrap();
        assert!(copied.router().delegate().ptr_eq(&router));
        assert!(copied.closer().ptr_eq(&closer));
    }

    #[test]
    fn test_clone_leaves_unbound_target_unbound() {
        let object = Object::plain();
        let (router, _, handlers) = handlers();

        let carrier = Binding::bind(Value::from(&object), handlers, BindingKind::Clone).unwrap();
        assert_ne!(carrier, object);
        assert!(carrier.is_carrier());
        assert_eq!(carrier.property("object"), Value::from(&object));
        assert!(!is_bound(&Value::from(&object)));
        assert!(is_bound(&Value::from(&carrier)));

        let binding = get_binding(&Value::from(&carrier)).unwrap();
        assert!(binding.router().is_substituting());
        assert!(binding.router().delegate().ptr_eq(&router));
        assert_eq!(binding.target().unwrap(), Value::from(&object));
    }

    #[test]
    fn test_clone_keeps_original_binding() {
        let object = Value::from(Object::plain());
        let (router, closer, handlers) = handlers();
        Binding::bind(object.clone(), handlers, BindingKind::Normal).unwrap();

        let carrier = Binding::bind(object.clone(), Handlers::new(), BindingKind::Clone).unwrap();

        let original = get_binding(&object).unwrap();
        assert_eq!(original.kind(), BindingKind::Normal);
        assert!(!original.router().is_substituting());

        let cloned = get_binding(&Value::from(&carrier)).unwrap();
        assert!(cloned.router().delegate().ptr_eq(&router));
        assert!(cloned.closer().ptr_eq(&closer));
    }

    #[test]
    fn test_clone_of_clone_unwraps_router() {
        let object = Object::plain();
        let (router, _, handlers) = handlers();
        let first = Binding::bind(Value::from(&object), handlers, BindingKind::Clone).unwrap();
        let first_router = get_binding(&Value::from(&first)).unwrap().router().clone();

        let second_handlers = Handlers::new()
            .router(first_router)
            .closer(Handler::noop());
        let second = Binding::bind(Value::from(&object), second_handlers, BindingKind::Clone).unwrap();

        let binding = get_binding(&Value::from(&second)).unwrap();
        assert!(binding.router().delegate().ptr_eq(&router));
    }

    #[test]
    fn test_unbind() {
        let object = Value::from(Object::plain());
        Binding::bind(object.clone(), handlers().2, BindingKind::Normal).unwrap();

        assert_eq!(unbind(object.clone()), object);
        assert!(!is_bound(&object));
        assert_eq!(unbind(object.clone()), object);
        assert_eq!(unbind(Value::from(5)), Value::from(5));
        assert!(!is_bound(&Value::from(5)));
    }

    #[test]
    fn test_binding_does_not_keep_object_alive() {
        let object = Object::plain();
        let id = object.id();
        Binding::bind(Value::from(&object), handlers().2, BindingKind::Normal).unwrap();
        assert!(lookup(id).is_some());

        drop(object);
        assert!(lookup(id).is_none());
    }

    #[test]
    fn test_concurrent_normal_binds() {
        let object = Value::from(Object::plain());

        let results: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| Binding::bind(object.clone(), handlers().2, BindingKind::Normal))
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err.kind(), ErrorKind::AlreadyBound(_)));
        }
    }

    #[test]
    fn test_state_reading_handlers_release_object() {
        let object = Object::plain();
        let id = object.id();
        let handlers = Handlers::new()
            .router(|state: State, _destination: Value| async move { state.value() })
            .closer(|state: State, _data: Value| async move { state.value() });
        Binding::bind(Value::from(&object), handlers, BindingKind::Normal).unwrap();

        let weak = object.downgrade();
        drop(object);
        assert!(weak.upgrade().is_none());
        assert!(lookup(id).is_none());
    }

    #[test]
    fn test_binding_kind_identifiers() {
        assert_eq!("clone".into_binding_kind().unwrap(), BindingKind::Clone);
        assert_eq!(true.into_binding_kind().unwrap(), BindingKind::Clone);
        assert_eq!(false.into_binding_kind().unwrap(), BindingKind::Normal);
        assert_eq!(None::<&str>.into_binding_kind().unwrap(), BindingKind::Normal);
        assert_eq!(
            String::from("rebind").into_binding_kind().unwrap(),
            BindingKind::Rebind
        );

        let err = "copy".into_binding_kind().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidBindingKind(s) if s == "copy"));
    }

    #[tokio::test]
    async fn test_route_and_close_build_state() {
        let object = Object::plain();
        let handlers = Handlers::new()
            .router(|state: State, destination: Value| async move {
                format!("{}:{}:{destination}", state.kind(), state.path())
            })
            .closer(|state: State, data: Value| async move {
                assert_eq!(state.origin(), &Value::from("origin"));
                data
            });
        Binding::bind(Value::from(&object), handlers, BindingKind::Normal).unwrap();
        let binding = get_binding(&Value::from(&object)).unwrap();

        let path = Path::from(vec![Value::from("a")]);
        let origin = Value::from("origin");
        let routed = binding.route(&path, &origin, Value::from("b")).await.unwrap();
        assert_eq!(routed, Value::from("route:a:b"));

        let closed = binding.close(&path, &origin, Value::from(3)).await.unwrap();
        assert_eq!(closed, Value::from(3));
    }

    #[tokio::test]
    async fn test_clone_router_substitutes_carrier() {
        let object = Object::plain();
        let target = object.clone();
        let handlers = Handlers::new()
            .router(move || {
                let target = target.clone();
                async move { target }
            })
            .closer(Handler::noop());

        let carrier = Binding::bind(Value::from(&object), handlers, BindingKind::Clone).unwrap();
        let other = Binding::bind(
            Value::from(&object),
            Handlers::from(&get_binding(&Value::from(&carrier)).unwrap()),
            BindingKind::Clone,
        )
        .unwrap();
        assert_ne!(carrier, other);

        for handle in [&carrier, &other] {
            let binding = get_binding(&Value::from(handle)).unwrap();
            let routed = binding
                .route(&Path::new(), &Value::Undefined, Value::from("self"))
                .await
                .unwrap();
            assert_eq!(routed, Value::from(handle));
        }
    }
}
