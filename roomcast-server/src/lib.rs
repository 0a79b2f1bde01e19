//! Roomcast server library
//!
//! Shared listening-rooms backend: durable timers over a key/value store,
//! per-room playback state machines, room lifecycle scheduling, and the
//! HTTP/SSE surface that exposes them.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod playback;
pub mod provider;
pub mod rooms;
pub mod runtime;
pub mod store;
pub mod timer;

pub use error::{Error, Result};
