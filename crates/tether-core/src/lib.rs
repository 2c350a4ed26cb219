//! # Tether Core
//!
//! The binding and addressing engine of tether.
//!
//! Any object can be *bound* to a router and a closer. Callers then address
//! the object by a path: every `route` step asks the current object's router
//! for the next object, and a final `close` step asks the last object's
//! closer for the result. This crate holds the pieces every path-builder is
//! made of:
//!
//! - **Values**: [`Value`], [`Object`] handles, [`Symbol`]s and [`Path`]s
//! - **Registry**: [`Binding`], [`BindingKind`] and the [`Router`] wrapper
//!   used by clone bindings
//! - **Request context**: the immutable [`State`] handed to every handler
//! - **Handlers**: [`Handler`], [`IntoHandler`], [`IntoReply`] and the
//!   [`Handlers`] builder
//! - **Side channels**: per-object [`resource`] metadata and the
//!   [`exposed`] helper that decides what remote callers may see
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_core::{Binding, BindingKind, Handlers, State, Value};
//!
//! let root = Binding::bind(
//!     Value::Null,
//!     Handlers::new()
//!         .router(|destination: Value| async move { format!("at {destination}") })
//!         .closer(|state: State, data: Value| async move { data }),
//!     BindingKind::Normal,
//! )?;
//! ```

pub mod binding;
pub mod error;
pub mod exposed;
pub mod handler;
pub mod object;
pub mod resource;
pub mod state;
pub mod value;

pub use binding::{
    Binding, BindingKind, IntoBindingKind, Router, get_binding, is_bound, unbind,
};
pub use error::{Error, ErrorKind, Result, Trace};
pub use exposed::Exposure;
pub use handler::{Handler, HandlerFuture, Handlers, IntoHandler, IntoReply};
pub use object::{Fields, Object, ObjectId, WeakObject};
pub use resource::Resource;
pub use state::{State, StepKind, ValueDescriptor};
pub use value::{Path, Symbol, Value};

// Re-export futures types used in public signatures.
pub use futures::future::BoxFuture;
