//! Dynamic views over path-builders.
//!
//! A [`View`] turns member access into routing and calling into closing:
//! `view.get("users")` is `builder.route("users")`, and `view.call(data)` is
//! `builder.close(data)`. Members listed in [`PathBuilder::PASSTHROUGH`]
//! (`then` and `catch`) are not routed; they yield the builder's own method,
//! bound to the builder.
//!
//! Rust has no structural property interception, so the view is an explicit
//! member API. It carries nothing but the wrapped builder: it has no own
//! keys, cannot be extended, and refuses deletion.

use std::any::Any;
use std::fmt;
use std::future::IntoFuture;

use futures::future::BoxFuture;

use tether_core::{Error, Result, Value};

use crate::builder::PathBuilder;

/// Wraps `builder` in a view.
pub fn proxify<B: PathBuilder>(builder: B) -> View<B> {
    View(builder)
}

/// Recovers the builder behind a view.
///
/// Returns `None` for anything that is not a `View<B>`.
pub fn unproxify<B: PathBuilder>(view: &dyn Any) -> Option<B> {
    view.downcast_ref::<View<B>>().map(|view| view.0.clone())
}

/// Member-access presentation of a path-builder.
#[derive(Clone)]
pub struct View<B>(B);

impl<B: PathBuilder> View<B> {
    /// Reads a member.
    ///
    /// Pass-through names yield a [`Method`]; everything else routes.
    pub fn get(&self, member: impl Into<Value>) -> Member<B> {
        let member = member.into();
        let passthrough = member.as_str().and_then(|name| {
            B::PASSTHROUGH
                .iter()
                .copied()
                .find(|candidate| *candidate == name)
        });

        match passthrough {
            Some(name) => Member::Method(Method {
                receiver: self.0.clone(),
                name,
            }),
            None => Member::View(View(self.0.route(member))),
        }
    }

    /// Calls the view, closing the builder with `data`.
    pub fn call(&self, data: impl Into<Value>) -> BoxFuture<'static, Result<Value>> {
        self.0.close(data.into())
    }

    /// Deleting a member always fails.
    pub fn delete(&self, _member: impl Into<Value>) -> bool {
        false
    }

    /// Views have no own keys.
    pub fn own_keys(&self) -> Vec<Value> {
        Vec::new()
    }

    pub fn is_extensible(&self) -> bool {
        false
    }

    pub fn builder(&self) -> &B {
        &self.0
    }

    pub fn into_inner(self) -> B {
        self.0
    }
}

impl<B: PathBuilder> IntoFuture for View<B> {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        self.0.close(Value::Undefined)
    }
}

impl<B: fmt::Debug> fmt::Debug for View<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("View").field(&self.0).finish()
    }
}

/// The result of reading a member of a [`View`].
#[derive(Debug, Clone)]
pub enum Member<B> {
    /// The member routed; a view of the routed builder.
    View(View<B>),
    /// The member passed through to a builder method.
    Method(Method<B>),
}

impl<B: PathBuilder> Member<B> {
    pub fn into_view(self) -> Option<View<B>> {
        match self {
            Member::View(view) => Some(view),
            Member::Method(_) => None,
        }
    }

    pub fn into_method(self) -> Option<Method<B>> {
        match self {
            Member::View(_) => None,
            Member::Method(method) => Some(method),
        }
    }
}

/// A pass-through builder method, bound to its receiver.
#[derive(Debug, Clone)]
pub struct Method<B> {
    receiver: B,
    name: &'static str,
}

impl<B: PathBuilder> Method<B> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn receiver(&self) -> &B {
        &self.receiver
    }

    /// See [`PathBuilder::then`].
    pub fn then<F, T>(self, f: F) -> BoxFuture<'static, T>
    where
        F: FnOnce(Result<Value>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.receiver.then(f)
    }

    /// See [`PathBuilder::catch`].
    pub fn catch<F>(self, f: F) -> BoxFuture<'static, Value>
    where
        F: FnOnce(Error) -> Value + Send + 'static,
    {
        self.receiver.catch(f)
    }
}

/// Awaiting a bound `then` or `catch` awaits the receiver's close.
impl<B: PathBuilder> IntoFuture for Method<B> {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        self.receiver.close(Value::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tether_core::{Binding, BindingKind, Handlers, Object, Path, State, Symbol};

    use super::*;
    use crate::{Api, Client, ProtocolFn};

    fn recording_api() -> (Api, Arc<Mutex<Vec<String>>>) {
        let routes = Arc::new(Mutex::new(Vec::new()));
        let log = routes.clone();
        let handlers = Handlers::new()
            .router(move |state: State, destination: Value| {
                log.lock().push(destination.to_string());
                async move { state.value() }
            })
            .closer(|state: State, data: Value| async move {
                format!("{}:{data}", state.path())
            });
        let root = Object::plain();
        Binding::bind(Value::from(&root), handlers, BindingKind::Normal).unwrap();
        (Api::new(root), routes)
    }

    fn echo_client() -> Client {
        let protocol = ProtocolFn::new()
            .closer(|path: Path, data: Value| async move { Ok(Value::from(format!("{path}:{data}"))) })
            .build()
            .unwrap();
        Client::new(protocol)
    }

    #[tokio::test]
    async fn test_member_access_routes() {
        let (api, routes) = recording_api();
        let view = api.view();

        let leaf = view.get("a").into_view().unwrap().get("b").into_view().unwrap();
        assert_eq!(leaf.builder().path().to_string(), "a/b");
        assert_eq!(leaf.call("x").await.unwrap(), Value::from("a/b:x"));
        assert_eq!(*routes.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_then_and_catch_pass_through() {
        let (api, routes) = recording_api();
        let view = api.route("a").view();

        let then = view.get("then").into_method().unwrap();
        assert_eq!(then.name(), "then");
        assert_eq!(then.receiver().path().to_string(), "a");
        let closed = then.then(|result| result.map(|value| value.to_string())).await;
        assert_eq!(closed.unwrap(), "a:undefined");

        let catch = view.get("catch").into_method().unwrap();
        assert_eq!(catch.catch(|_| Value::Null).await, Value::from("a:undefined"));
        assert_eq!(*routes.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_other_names_route() {
        let client = echo_client();
        let view = client.view();
        let symbol = Symbol::new("s");

        let routed = view.get("finally").into_view().unwrap();
        assert_eq!(routed.builder().path().to_string(), "finally");

        let routed = view.get(symbol.clone()).into_view().unwrap();
        assert_eq!(routed.builder().path()[0], Value::from(symbol));
        assert_eq!(view.get(1).into_view().unwrap().await.unwrap(), Value::from("1:undefined"));
    }

    #[test]
    fn test_view_is_sealed() {
        let view = echo_client().view();
        assert!(!view.delete("a"));
        assert!(view.own_keys().is_empty());
        assert!(!view.is_extensible());
    }

    #[test]
    fn test_unproxify_round_trip() {
        let client = echo_client().route("a");
        let view = proxify(client.clone());
        let recovered = unproxify::<Client>(&view).unwrap();
        assert_eq!(recovered.path(), client.path());
        assert!(Arc::ptr_eq(recovered.protocol(), client.protocol()));

        let (api, _) = recording_api();
        let view = proxify(api.route("x"));
        assert_eq!(unproxify::<Api>(&view).unwrap().path().to_string(), "x");

        assert!(unproxify::<Api>(&client).is_none());
        assert!(unproxify::<Client>(&view).is_none());
        assert!(unproxify::<Api>(&42).is_none());
    }

    #[tokio::test]
    async fn test_awaiting_view_closes() {
        let (api, _) = recording_api();
        assert_eq!(api.view().await.unwrap(), Value::from(":undefined"));
    }
}
