//! The contract shared by local and remote path-builders.

use futures::FutureExt;
use futures::future::BoxFuture;
use tether_core::{Error, Path, Result, Value};

/// A persistent, chainable handle that addresses a path.
///
/// Builders never change: [`route`](PathBuilder::route) returns a new builder
/// and [`close`](PathBuilder::close) only reads the receiver.
pub trait PathBuilder: Clone + Send + Sync + 'static {
    /// Member names a [`View`](crate::View) passes through to the builder
    /// instead of routing.
    const PASSTHROUGH: &'static [&'static str] = &["then", "catch"];

    /// Returns a builder one step further down the path.
    fn route(&self, destination: Value) -> Self;

    /// Closes the addressed path with `data`.
    fn close(&self, data: Value) -> BoxFuture<'static, Result<Value>>;

    /// The destinations routed so far.
    fn path(&self) -> &Path;

    /// Chains `route` once per destination, left to right.
    fn route_all<I>(&self, destinations: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        destinations
            .into_iter()
            .fold(self.clone(), |builder, destination| {
                builder.route(destination.into())
            })
    }

    /// Closes without data and maps the outcome.
    fn then<F, T>(&self, f: F) -> BoxFuture<'static, T>
    where
        F: FnOnce(Result<Value>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.close(Value::Undefined).map(f).boxed()
    }

    /// Closes without data and recovers from a failure.
    fn catch<F>(&self, f: F) -> BoxFuture<'static, Value>
    where
        F: FnOnce(Error) -> Value + Send + 'static,
    {
        self.close(Value::Undefined)
            .map(|result| result.unwrap_or_else(f))
            .boxed()
    }
}
