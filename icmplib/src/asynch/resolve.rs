//! Async name resolution, wrapping the blocking [`crate::resolve::resolve`]
//! in [`tokio::task::spawn_blocking`] — `trust-dns-resolver`'s synchronous
//! `Resolver` does its own blocking I/O internally, so running it on the
//! async executor's worker threads directly would stall other tasks.

use std::net::IpAddr;

use crate::error::LibError;
use crate::request::Family;

pub async fn async_resolve(host: &str, family: Option<Family>) -> Result<Vec<IpAddr>, LibError> {
    let host = host.to_string();
    tokio::task::spawn_blocking(move || crate::resolve::resolve(&host, family))
        .await
        .map_err(|_| LibError::SocketError(crate::error::SocketError::UnavailableError))?
}
