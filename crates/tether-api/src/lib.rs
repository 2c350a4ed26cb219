//! # Tether Api
//!
//! Path-builders on top of [`tether_core`].
//!
//! - [`Api`]: the local builder. Every step consults the registry and runs
//!   the bound router or closer.
//! - [`Client`]: the remote builder. Routing is bookkeeping; closing goes
//!   through a [`Protocol`].
//! - [`View`]: member access and calls on top of either builder, created by
//!   [`proxify`] and undone by [`unproxify`].
//!
//! Both builders implement [`PathBuilder`] and share one contract: they are
//! persistent, they can be awaited (which closes without data), and failures
//! carry a trace of the step that failed.

pub mod api;
pub mod builder;
pub mod client;
pub mod view;

pub use api::Api;
pub use builder::PathBuilder;
pub use client::{Client, FnProtocol, Link, Protocol, ProtocolFn, SubscriptionId};
pub use view::{Member, Method, View, proxify, unproxify};
