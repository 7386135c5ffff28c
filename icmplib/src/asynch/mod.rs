//! Async API: tokio-based equivalents of [`crate::ping`] and
//! [`crate::multiping`], for callers already running an async executor.
//!
//! One socket per family sits behind a background listener task; callers
//! get a lightweight [`Pinger`] that registers a oneshot channel per probe
//! and waits on it, correlated by `(identifier, sequence)`.

mod listener;
mod ping;
mod resolve;
mod socket;

pub use listener::{Listener, Pinger};
pub use ping::{async_multiping, async_ping};
pub use resolve::async_resolve;
