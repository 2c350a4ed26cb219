//! # Tether Transport
//!
//! Transports behind [`tether_api::Client`].
//!
//! The only transport shipped here is the in-process [`loopback`]: it serves
//! an [`Api`](tether_api::Api) on a background task and hands out a
//! [`Protocol`](tether_api::Protocol) that talks to it through JSON
//! [`frame`]s. Network transports plug in the same way, by implementing
//! `Protocol::closer`.

pub mod frame;
pub mod loopback;

pub use frame::{RequestFrame, ResponseFrame};
pub use loopback::{LoopbackConfig, LoopbackProtocol, ServerHandle, serve};
