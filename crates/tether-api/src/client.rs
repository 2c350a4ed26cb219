//! The remote path-builder.
//!
//! A [`Client`] shares the chaining contract of [`Api`](crate::Api), but it
//! never consults the registry: routing only extends the path, and closing
//! hands the path and the data to a [`Protocol`], the single integration
//! point for real transports.
//!
//! ```rust,ignore
//! let protocol = ProtocolFn::new()
//!     .closer(|path: Path, data: Value| async move { transport.request(path, data).await })
//!     .init(|link: &Link| link.set_connected(true))
//!     .build()?;
//!
//! let client = Client::new(protocol);
//! let answer = client.route("math").route("add").close(vec![1, 2]).await?;
//! ```

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{Instrument, debug, debug_span};

use tether_core::{ErrorKind, Path, Result, StepKind, Value};

use crate::builder::PathBuilder;
use crate::view::{View, proxify};

// =============================================================================
// Protocol
// =============================================================================

/// A transport behind a [`Client`].
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    /// Performs a close of `path` with `data` on the remote side.
    async fn closer(&self, path: Path, data: Value) -> Result<Value>;

    /// Called once, synchronously, when a client is wired to this protocol.
    ///
    /// The [`Link`] is the client's connection flag; protocols keep a clone
    /// and flip it as their connection comes and goes.
    fn init(&self, _link: &Link) {}
}

type Closer = Arc<dyn Fn(Path, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
type Init = Arc<dyn Fn(&Link) + Send + Sync>;

/// Builds a [`Protocol`] from closures.
#[derive(Default)]
pub struct ProtocolFn {
    closer: Option<Closer>,
    init: Option<Init>,
}

impl ProtocolFn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: Fn(Path, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.closer = Some(Arc::new(move |path, data| closer(path, data).boxed()));
        self
    }

    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&Link) + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Fails with `InvalidProtocol` when no closer was given.
    pub fn build(self) -> Result<FnProtocol> {
        let closer = self.closer.ok_or_else(|| {
            ErrorKind::InvalidProtocol("protocols have to offer a closer function".into())
        })?;
        Ok(FnProtocol {
            closer,
            init: self.init,
        })
    }
}

/// A protocol made of closures. See [`ProtocolFn`].
pub struct FnProtocol {
    closer: Closer,
    init: Option<Init>,
}

#[async_trait]
impl Protocol for FnProtocol {
    async fn closer(&self, path: Path, data: Value) -> Result<Value> {
        (self.closer)(path, data).await
    }

    fn init(&self, link: &Link) {
        if let Some(init) = &self.init {
            init(link);
        }
    }
}

// =============================================================================
// Link
// =============================================================================

/// Handle returned by [`Link::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(bool) + Send + Sync>;

/// Connection state shared between a client and its protocol.
///
/// Observers are notified only when the state actually changes.
#[derive(Clone)]
pub struct Link(Arc<LinkInner>);

struct LinkInner {
    state: watch::Sender<bool>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

impl Link {
    /// A link in the disconnected state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self(Arc::new(LinkInner {
            state,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }))
    }

    pub fn is_connected(&self) -> bool {
        *self.0.state.borrow()
    }

    pub fn set_connected(&self, connected: bool) {
        let changed = self.0.state.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
        if !changed {
            return;
        }

        debug!(connected, "Connection state changed");
        let observers: Vec<Observer> = self
            .0
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(connected);
        }
    }

    /// Registers `observer` for connection state changes.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.0.next_id.fetch_add(1, Ordering::Relaxed));
        self.0.observers.lock().push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut observers = self.0.observers.lock();
            observers
                .iter()
                .position(|(other, _)| *other == id)
                .map(|index| observers.remove(index))
        };
        removed.is_some()
    }

    /// A receiver that observes state changes asynchronously.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.0.state.subscribe()
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("connected", &self.is_connected())
            .field("observers", &self.0.observers.lock().len())
            .finish()
    }
}

// =============================================================================
// Client
// =============================================================================

/// A chainable handle addressing a path behind a [`Protocol`].
#[derive(Clone)]
pub struct Client {
    protocol: Arc<dyn Protocol>,
    link: Link,
    path: Path,
}

impl Client {
    /// Wires a client to `protocol` and runs the protocol's `init`.
    pub fn new<P: Protocol>(protocol: P) -> Self {
        Self::from_arc(Arc::new(protocol))
    }

    pub fn from_arc(protocol: Arc<dyn Protocol>) -> Self {
        let link = Link::new();
        protocol.init(&link);
        debug!(connected = link.is_connected(), "Client wired to protocol");
        Self {
            protocol,
            link,
            path: Path::new(),
        }
    }

    /// Extends the path. No I/O happens until [`close`](Client::close).
    pub fn route(&self, destination: impl Into<Value>) -> Client {
        Client {
            protocol: Arc::clone(&self.protocol),
            link: self.link.clone(),
            path: self.path.push(destination),
        }
    }

    /// Extends the path by every destination in order.
    pub fn route_all<I>(&self, destinations: I) -> Client
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Client {
            protocol: Arc::clone(&self.protocol),
            link: self.link.clone(),
            path: self.path.extend(destinations),
        }
    }

    /// Sends a close of the current path through the protocol.
    pub fn close(&self, data: impl Into<Value>) -> BoxFuture<'static, Result<Value>> {
        let data = data.into();
        let protocol = Arc::clone(&self.protocol);
        let path = self.path.clone();
        let span = debug_span!("remote_close", path = %path);

        async move {
            let result = protocol.closer(path.clone(), data.clone()).await;
            result.map_err(|err| err.tag(StepKind::Close, &path, Some(data)))
        }
        .instrument(span)
        .boxed()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Whether the protocol currently reports a connection.
    pub fn connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.link.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.link.unsubscribe(id)
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.link.watch()
    }

    /// Wraps this builder in a dynamic view.
    pub fn view(&self) -> View<Client> {
        proxify(self.clone())
    }
}

impl PathBuilder for Client {
    fn route(&self, destination: Value) -> Self {
        Client::route(self, destination)
    }

    fn close(&self, data: Value) -> BoxFuture<'static, Result<Value>> {
        Client::close(self, data)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl IntoFuture for Client {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        self.close(Value::Undefined)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("path", &self.path)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tether_core::Error;

    use super::*;

    fn echo() -> FnProtocol {
        ProtocolFn::new()
            .closer(|path: Path, data: Value| async move {
                if data.as_str() == Some("missing") {
                    return Err(Error::exposed("unknown key"));
                }
                Ok(Value::from(format!("{path}:{data}")))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_route_is_bookkeeping() {
        let client = Client::new(echo());
        let routed = client.route("a").route_all([1, 2]);

        assert!(client.path().is_empty());
        assert_eq!(routed.path().to_string(), "a/1/2");
        assert_eq!(routed.close("x").await.unwrap(), Value::from("a/1/2:x"));
        assert_eq!(routed.await.unwrap(), Value::from("a/1/2:undefined"));
    }

    #[tokio::test]
    async fn test_close_failure_is_tagged() {
        let err = Client::new(echo()).route("a").close("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown key");

        let trace = err.trace().unwrap();
        assert_eq!(trace.kind, StepKind::Close);
        assert_eq!(trace.path.to_string(), "a");
        assert_eq!(trace.data, Some(Value::from("missing")));
    }

    #[test]
    fn test_protocol_requires_closer() {
        let err = ProtocolFn::new().init(|_| {}).build().err().unwrap();
        assert!(matches!(err.kind(), ErrorKind::InvalidProtocol(_)));
    }

    #[test]
    fn test_init_runs_once_with_link() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let protocol = ProtocolFn::new()
            .closer(|_, _| async { Ok(Value::Undefined) })
            .init(move |link: &Link| {
                counter.fetch_add(1, Ordering::SeqCst);
                link.set_connected(true);
            })
            .build()
            .unwrap();

        let client = Client::new(protocol);
        let _routed = client.route("a").route("b");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.connected());
    }

    struct Fixed;

    #[async_trait]
    impl Protocol for Fixed {
        async fn closer(&self, path: Path, _data: Value) -> Result<Value> {
            Ok(Value::from(path.len()))
        }
    }

    #[tokio::test]
    async fn test_default_init_leaves_link_alone() {
        let client = Client::new(Fixed);
        assert!(!client.connected());
        assert_eq!(client.route("a").route("b").await.unwrap(), Value::from(2));
        assert!(!client.connected());
    }

    #[test]
    fn test_observers_fire_on_change_only() {
        let client = Client::new(echo());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = client.subscribe(move |connected| sink.lock().push(connected));

        assert!(!client.connected());
        client.link().set_connected(false);
        client.link().set_connected(true);
        client.link().set_connected(true);
        client.link().set_connected(false);
        assert_eq!(*seen.lock(), vec![true, false]);

        assert!(client.unsubscribe(id));
        assert!(!client.unsubscribe(id));
        client.link().set_connected(true);
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_watch_receives_changes() {
        let client = Client::new(echo());
        let mut watch = client.watch();
        assert!(!*watch.borrow());

        let link = client.link().clone();
        let mut changed = tokio_test::task::spawn(watch.changed());
        tokio_test::assert_pending!(changed.poll());

        link.set_connected(true);
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
        drop(changed);
        assert!(*watch.borrow_and_update());
    }
}
