//! The local path-builder.
//!
//! An [`Api`] addresses a bound object through the registry. Each instance
//! holds a shared, lazily driven future of the currently addressed object,
//! the path that led there and an origin value threaded through every step.
//!
//! Nothing runs until the builder is closed (or its [`object`](Api::object)
//! is awaited). Every route step then waits for the previous one, so
//! handlers may rely on the side effects of earlier steps.
//!
//! ```rust,ignore
//! let api = Api::new(root);
//! let name = api.route("users").route(7).route("name").close(Value::Undefined).await?;
//! ```

use std::future::{Future, IntoFuture};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{Instrument, debug_span};

use tether_core::{Error, ErrorKind, Object, Path, Result, StepKind, Value, get_binding, is_bound};

use crate::builder::PathBuilder;
use crate::view::{View, proxify};

type Pending = Shared<BoxFuture<'static, Result<Value>>>;

/// A chainable handle addressing a bound object.
#[derive(Clone)]
pub struct Api {
    target: Pending,
    path: Path,
    origin: Value,
}

impl Api {
    /// Addresses `object`, which is expected to be bound.
    pub fn new(object: Object) -> Self {
        Self::resolve(
            futures::future::ready(Ok(Value::Object(object))),
            Path::new(),
            Value::Map(Default::default()),
        )
    }

    fn resolve<F>(pending: F, path: Path, origin: Value) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let at = path.clone();
        let target = async move {
            let value = pending.await?;
            if !is_bound(&value) {
                return Err(not_exposed(&at));
            }
            Ok(value)
        }
        .map({
            let at = path.clone();
            move |result: Result<Value>| result.map_err(|err| err.tag(StepKind::Route, &at, None))
        })
        .boxed()
        .shared();

        Self {
            target,
            path,
            origin,
        }
    }

    /// Routes one step further, to `destination`.
    pub fn route(&self, destination: impl Into<Value>) -> Api {
        let destination = destination.into();
        let next = self.path.push(destination.clone());

        let target = self.target.clone();
        let path = self.path.clone();
        let origin = self.origin.clone();
        let span = debug_span!("route", path = %next);
        let step = async move {
            let value = target.await?;
            let binding = get_binding(&value).ok_or_else(|| not_exposed(&path))?;
            binding.route(&path, &origin, destination).await
        }
        .instrument(span);

        Api::resolve(step, next, self.origin.clone())
    }

    /// Routes through every destination in order. Equivalent to chaining
    /// [`route`](Api::route) once per destination.
    pub fn route_all<I>(&self, destinations: I) -> Api
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        PathBuilder::route_all(self, destinations)
    }

    /// Closes the addressed object with `data`.
    ///
    /// Failures carry a close trace with this builder's path and `data`,
    /// unless an earlier step already traced them.
    pub fn close(&self, data: impl Into<Value>) -> BoxFuture<'static, Result<Value>> {
        let data = data.into();
        let target = self.target.clone();
        let path = self.path.clone();
        let origin = self.origin.clone();
        let span = debug_span!("close", path = %path);

        async move {
            let result = async {
                let value = target.await?;
                let binding = get_binding(&value).ok_or_else(|| not_exposed(&path))?;
                binding.close(&path, &origin, data.clone()).await
            }
            .await;
            result.map_err(|err| err.tag(StepKind::Close, &path, Some(data)))
        }
        .instrument(span)
        .boxed()
    }

    /// Returns a builder addressing the same object with another origin.
    ///
    /// Fails with `InvalidOrigin` unless `origin` is an object or a map.
    /// Nothing is resolved again.
    pub fn origin(&self, origin: impl Into<Value>) -> Result<Api> {
        let origin = origin.into();
        if !matches!(origin, Value::Object(_) | Value::Map(_)) {
            return Err(ErrorKind::InvalidOrigin(origin.to_string()).into());
        }

        Ok(Api {
            target: self.target.clone(),
            path: self.path.clone(),
            origin,
        })
    }

    /// The origin threaded through every step of this builder.
    pub fn current_origin(&self) -> &Value {
        &self.origin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves to the logical target of the addressed binding.
    pub fn object(&self) -> BoxFuture<'static, Result<Value>> {
        let target = self.target.clone();
        let path = self.path.clone();
        async move {
            let value = target.await?;
            get_binding(&value)
                .ok_or_else(|| not_exposed(&path))?
                .target()
        }
        .boxed()
    }

    /// Wraps this builder in a dynamic view.
    pub fn view(&self) -> View<Api> {
        proxify(self.clone())
    }
}

fn not_exposed(path: &Path) -> Error {
    Error::new(ErrorKind::NotExposed(path.clone())).expose()
}

impl PathBuilder for Api {
    fn route(&self, destination: Value) -> Self {
        Api::route(self, destination)
    }

    fn close(&self, data: Value) -> BoxFuture<'static, Result<Value>> {
        Api::close(self, data)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Awaiting a builder closes it without data.
impl IntoFuture for Api {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        self.close(Value::Undefined)
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("path", &self.path)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
