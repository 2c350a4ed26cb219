//! # Tether
//!
//! Bind any object to a *router* and a *closer*, then address it by path.
//!
//! ## Overview
//!
//! A path-builder starts at a bound object. Each `route(destination)` asks
//! the current object's router for the next object; `close(data)` asks the
//! last one's closer for the result. Nothing runs until the chain is closed
//! or awaited.
//!
//! ```text
//! api(root) ──route("users")──▶ users ──route(7)──▶ user#7 ──close(data)──▶ result
//!              router(root)              router(users)        closer(user#7)
//! ```
//!
//! - [`api`] builds chains over local objects.
//! - [`client`] builds the same chains over a [`Protocol`], for objects that
//!   live elsewhere.
//! - [`proxify`] presents either as a member-access view.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! let root = Object::plain();
//! tether::bind(
//!     &root,
//!     Handlers::new()
//!         .router(|destination: Value| async move { lookup(destination) })
//!         .closer(|state: State, data: Value| async move { state.value() }),
//!     "normal",
//! )?;
//!
//! let user = tether::api(root)?.route("users").route(7).close(()).await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use tether_api as builders;
pub use tether_core as core;
pub use tether_runtime as runtime;
pub use tether_transport as transport;

pub use tether_api::{Api, Client, PathBuilder, Protocol, View, proxify, unproxify};
pub use tether_core::{
    BindingKind, Error, ErrorKind, Handlers, Object, Resource, Result, State, Value, exposed,
    is_bound, unbind,
};

use tether_core::{Binding, IntoBindingKind};

/// Binds `target` to `handlers`.
///
/// `kind` accepts a [`BindingKind`], `"normal"`, `"clone"` or `"rebind"`, a
/// `bool` (`true` selects clone) or `None`. Missing handlers resolve to
/// `undefined`, except that a clone of a bound object inherits the halves
/// left out.
pub fn bind(
    target: impl Into<Value>,
    handlers: Handlers,
    kind: impl IntoBindingKind,
) -> Result<Object> {
    let target = target.into();
    let kind = kind.into_binding_kind()?;
    let handlers = if kind == BindingKind::Clone && is_bound(&target) {
        handlers
    } else {
        handlers.with_defaults()
    };
    Binding::bind(target, handlers, kind)
}

/// Starts a local chain at `target`.
///
/// A bound object is used as it is. Anything else is first bound with
/// default handlers, so `Null` yields a chain over a fresh carrier and
/// primitives fail with `InvalidTargetKind`.
pub fn api(target: impl Into<Value>) -> Result<Api> {
    match target.into() {
        Value::Object(object) if is_bound(&Value::from(&object)) => Ok(Api::new(object)),
        target => bind(target, Handlers::new(), None::<&str>).map(Api::new),
    }
}

/// Binds `target`, then starts a local chain at the bound object.
pub fn api_with(
    target: impl Into<Value>,
    handlers: Handlers,
    kind: impl IntoBindingKind,
) -> Result<Api> {
    bind(target, handlers, kind).map(Api::new)
}

/// Starts a remote chain over `protocol`.
pub fn client<P: Protocol>(protocol: P) -> Client {
    Client::new(protocol)
}

/// Returns the resource of `target`, or an empty one.
pub fn resource(target: &Value) -> Resource {
    tether_core::resource::get(target)
}

/// Attaches `resource` to `target`. An object takes a resource only once.
pub fn set_resource(target: &Value, resource: Resource) -> Result<Object> {
    tether_core::resource::attach(target, resource)
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    // Entry points
    pub use crate::{api, api_with, bind, client, proxify, unproxify};

    // Builders and views
    pub use tether_api::{Api, Client, Link, PathBuilder, Protocol, ProtocolFn, View};

    // Handler side
    pub use tether_core::{
        BindingKind, Error, ErrorKind, Handlers, Object, Path, Resource, Result, State, StepKind,
        Symbol, Value,
    };

    // Runtime
    pub use tether_runtime::{TetherConfig, TetherRuntime};
}
