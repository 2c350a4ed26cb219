//! Routers and closers.
//!
//! A [`Handler`] is a type-erased async function of a [`State`] and a step
//! input. Handlers are rarely built by hand: any async closure taking no
//! arguments, the input, or the state and the input converts into one via
//! [`IntoHandler`], and its return value converts via [`IntoReply`].
//!
//! ```rust,ignore
//! let handlers = Handlers::new()
//!     .router(|state: State, destination: Value| async move {
//!         state.value().as_object().map(|o| o.property(&destination.to_string()))
//!     })
//!     .closer(|data: Value| async move { format!("closed with {data}") });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::binding::{Binding, Router};
use crate::error::{Error, Result};
use crate::object::Object;
use crate::state::State;
use crate::value::{Symbol, Value};

/// Future returned by handlers.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

// =============================================================================
// IntoReply - Handle handler return values
// =============================================================================

/// Conversion of handler return values into a step result.
pub trait IntoReply {
    fn into_reply(self) -> Result<Value>;
}

macro_rules! impl_into_reply {
    ($($ty:ty),*) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Value> {
                    Ok(Value::from(self))
                }
            }
        )*
    };
}

impl_into_reply!(Value, (), Object, String, &'static str, bool, f64, i32, i64, usize, Symbol);

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Value> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Value::Undefined),
        }
    }
}

impl<T: IntoReply, E: Into<Error>> IntoReply for Result<T, E> {
    fn into_reply(self) -> Result<Value> {
        self.map_err(Into::into)?.into_reply()
    }
}

// =============================================================================
// Handler
// =============================================================================

/// A type-erased router or closer.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(State, Value) -> HandlerFuture + Send + Sync>);

impl Handler {
    /// Wraps an async function of the state and the step input.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(State, Value) -> HandlerFuture + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wraps a synchronous function of the state and the step input.
    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn(State, Value) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Self::new(move |state, input| future::ready(f(state, input).into_reply()).boxed())
    }

    /// A handler that ignores its input and resolves to `Undefined`.
    pub fn noop() -> Self {
        Self::new(|_, _| future::ready(Ok(Value::Undefined)).boxed())
    }

    pub fn call(&self, state: State, input: Value) -> HandlerFuture {
        (self.0)(state, input)
    }

    /// Returns `true` if both handles point at the same function.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0))
    }
}

// =============================================================================
// IntoHandler
// =============================================================================

/// Conversion into a [`Handler`].
///
/// The marker type `M` distinguishes the supported closure shapes so that a
/// closure implements exactly one of them.
pub trait IntoHandler<M>: Send + Sync + 'static {
    fn into_handler(self) -> Handler;
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

/// Substituting routers are unwrapped to their delegate.
impl IntoHandler<Router> for Router {
    fn into_handler(self) -> Handler {
        self.delegate().clone()
    }
}

impl<F, Fut, R> IntoHandler<()> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(move |_, _| self().map(IntoReply::into_reply).boxed())
    }
}

impl<F, Fut, R> IntoHandler<(Value,)> for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(move |_, input| self(input).map(IntoReply::into_reply).boxed())
    }
}

impl<F, Fut, R> IntoHandler<(State, Value)> for F
where
    F: Fn(State, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(move |state, input| self(state, input).map(IntoReply::into_reply).boxed())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// A router/closer pair handed to [`Binding::bind`].
///
/// Either half may be left out; the registry decides whether a missing half
/// is an error or can be filled from an existing binding.
///
/// Handlers should reach their target through [`State::value`] rather than
/// capturing the bound [`Object`]. The registry owns its handlers, so a
/// captured object is kept alive by its own binding and never released.
#[derive(Debug, Clone, Default)]
pub struct Handlers {
    pub(crate) router: Option<Handler>,
    pub(crate) closer: Option<Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router<M>(mut self, router: impl IntoHandler<M>) -> Self {
        self.router = Some(router.into_handler());
        self
    }

    pub fn closer<M>(mut self, closer: impl IntoHandler<M>) -> Self {
        self.closer = Some(closer.into_handler());
        self
    }

    /// Fills missing halves with [`Handler::noop`].
    pub fn with_defaults(self) -> Self {
        Self {
            router: Some(self.router.unwrap_or_else(Handler::noop)),
            closer: Some(self.closer.unwrap_or_else(Handler::noop)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.router.is_some() && self.closer.is_some()
    }
}

/// Copies the router and closer of an existing binding.
impl From<&Binding> for Handlers {
    fn from(binding: &Binding) -> Self {
        Self {
            router: Some(binding.router().delegate().clone()),
            closer: Some(binding.closer().clone()),
        }
    }
}

impl From<&Arc<Binding>> for Handlers {
    fn from(binding: &Arc<Binding>) -> Self {
        Self::from(binding.as_ref())
    }
}
