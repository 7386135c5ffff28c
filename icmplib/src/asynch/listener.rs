//! Shared-socket reply dispatch: one background task owns the socket's
//! receive side and fans replies out to whichever in-flight probe is
//! waiting, via a `HashMap` of oneshot senders keyed by
//! `(identifier, sequence)`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, trace};

use crate::error::{LibError, SocketError};
use crate::reply::EchoReply;
use crate::request::{EchoRequest, Family};

use super::socket::AsyncIcmpSocket;

type CorrelationKey = (u16, u16);
type PingMap = Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<EchoReply>>>>;

/// Owns one socket for one address family and a background task that
/// demultiplexes incoming replies to whichever [`Pinger::ping`] call is
/// waiting on the matching `(identifier, sequence)`.
pub struct Listener {
    socket: Arc<AsyncIcmpSocket>,
    map: PingMap,
    family: Family,
    // Shared across every `Pinger` drawn from this `Listener`, since all of
    // them hand out the same identifier (the process id, or whatever a
    // caller overrides it to) — the sequence is what keeps concurrently
    // pinged destinations of the same family from colliding in `map`.
    next_sequence: AtomicU16,
    // Kept alive so the spawned task's receiver doesn't close; dropping
    // the Listener closes it and the task exits.
    #[allow(dead_code)]
    notify_shutdown: broadcast::Sender<()>,
}

impl Listener {
    pub fn new(family: Family, privileged: bool, source: Option<IpAddr>) -> Result<Self, LibError> {
        let socket = Arc::new(AsyncIcmpSocket::open(family, privileged, source)?);
        let map: PingMap = Arc::new(Mutex::new(HashMap::new()));
        let (notify_shutdown, mut shutdown) = broadcast::channel(1);

        let task_socket = socket.clone();
        let task_map = map.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    reply = task_socket.recv() => {
                        match reply {
                            Ok(reply) => {
                                let now = Instant::now();
                                let sender = task_map.lock().remove(&(reply.identifier, reply.sequence));
                                if let Some(sender) = sender {
                                    trace!(ident = reply.identifier, seq = reply.sequence, "dispatching reply");
                                    let _ = sender.send(reply);
                                    let _ = now;
                                } else {
                                    debug!(
                                        ident = reply.identifier,
                                        seq = reply.sequence,
                                        "reply for unknown or already-completed probe"
                                    );
                                }
                            }
                            Err(err) => {
                                error!(?err, "async icmp listener socket error");
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("async icmp listener shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            socket,
            map,
            family,
            next_sequence: AtomicU16::new(0),
            notify_shutdown,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Hands out a sequence number unique across every `Pinger` sharing this
    /// `Listener`, so destinations that end up with identical identifiers
    /// still get distinct `(identifier, sequence)` correlation keys.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pinger(&self) -> Pinger {
        Pinger {
            socket: self.socket.clone(),
            map: self.map.clone(),
            identifier: process::id() as u16,
        }
    }
}

/// A sender bound to one socket, handing out `ping` calls that register
/// themselves in the shared correlation map before sending.
pub struct Pinger {
    socket: Arc<AsyncIcmpSocket>,
    map: PingMap,
    identifier: u16,
}

impl Pinger {
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Sends one Echo Request and awaits its reply, or `None` on timeout.
    /// An ICMP error reply also resolves as `None` (no RTT to report),
    /// matching the synchronous engines' behavior.
    pub async fn ping(
        &self,
        destination: IpAddr,
        sequence: u16,
        ttl: u8,
        payload_size: usize,
        timeout: Duration,
    ) -> Result<Option<f64>, LibError> {
        let mut request = EchoRequest::new(destination, self.identifier, sequence)
            .with_ttl(ttl)
            .with_payload_size(payload_size);

        let (tx, rx) = oneshot::channel();
        let identifier = self.identifier;
        self.map.lock().insert((identifier, sequence), tx);
        let guard = Guard {
            map: self.map.clone(),
            key: (identifier, sequence),
        };

        self.socket.send(&mut request).await.map_err(|err| {
            drop(guard);
            LibError::SocketError(err)
        })?;
        let send_time = request.send_time.expect("send_time set on successful send");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => {
                drop(guard);
                if reply.raise_for_status().is_err() {
                    return Ok(None);
                }
                let rtt = reply
                    .receive_time
                    .saturating_duration_since(send_time)
                    .as_secs_f64()
                    * 1000.0;
                Ok(Some(rtt))
            }
            Ok(Err(_)) => {
                drop(guard);
                Err(LibError::SocketError(SocketError::UnavailableError))
            }
            Err(_elapsed) => {
                drop(guard);
                Ok(None)
            }
        }
    }
}

/// Removes this probe's map entry on drop, so a dropped or timed-out
/// `ping` future never leaves a stale sender behind.
struct Guard {
    map: PingMap,
    key: CorrelationKey,
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.map.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_sequence_is_unique_even_with_a_shared_identifier() {
        // Every Pinger handed out by one Listener carries the same
        // identifier, so concurrently pinged destinations of the same
        // family must be told apart by sequence alone.
        let counter = AtomicU16::new(0);
        let identifier = process::id() as u16;
        let mut seen = HashMap::new();
        for destination in 0..4 {
            for _probe in 0..4 {
                let sequence = counter.fetch_add(1, Ordering::Relaxed);
                assert!(
                    seen.insert((identifier, sequence), destination).is_none(),
                    "collision on (identifier, sequence) = ({identifier}, {sequence})"
                );
            }
        }
    }
}
