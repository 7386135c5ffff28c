//! Single-host ping engine: `count` probes at a fixed inter-probe
//! `interval`, with a per-probe receive loop that discards replies for
//! other `(identifier, sequence)` pairs until a match arrives or the
//! deadline expires.

use std::net::IpAddr;
use std::process;
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{LibError, SocketError};
use crate::request::{EchoRequest, Family, DEFAULT_PAYLOAD_SIZE};
use crate::resolve;
use crate::socket::IcmpSocket;
use crate::stats::Host;

#[derive(Debug, Clone)]
pub struct PingOptions {
    pub count: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub identifier: Option<u16>,
    pub source: Option<IpAddr>,
    pub family: Option<Family>,
    pub privileged: bool,
    pub payload: Option<Vec<u8>>,
    pub payload_size: usize,
    pub ttl: u8,
    pub traffic_class: u8,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
            identifier: None,
            source: None,
            family: None,
            privileged: false,
            payload: None,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            ttl: 64,
            traffic_class: 0,
        }
    }
}

/// Pings `address` (hostname or literal) `options.count` times and returns
/// the aggregated [`Host`].
pub fn ping(address: &str, options: &PingOptions) -> Result<Host, LibError> {
    let candidates = resolve::resolve(address, options.family)?;
    let destination = candidates[0];
    let family = Family::of(&destination);

    let mut socket = IcmpSocket::open(family, options.privileged, options.source)?;
    let requested_identifier = options.identifier.unwrap_or_else(|| process::id() as u16);

    let mut rtts = Vec::new();

    for seq in 0..options.count {
        let mut request = EchoRequest::new(destination, requested_identifier, seq as u16)
            .with_ttl(options.ttl)
            .with_traffic_class(options.traffic_class);
        request = match &options.payload {
            Some(bytes) => request.with_payload(bytes.clone()),
            None => request.with_payload_size(options.payload_size),
        };

        if let Err(err) = socket.send(&mut request) {
            debug!(?err, seq, "ping send failed");
            if seq + 1 < options.count {
                thread::sleep(options.interval);
            }
            continue;
        }

        // On unprivileged sockets the kernel replaces the identifier; once
        // known, match against that instead.
        let match_identifier = socket.bound_identifier().unwrap_or(requested_identifier);

        if let Some(rtt) = wait_for_matching_reply(&mut socket, &request, match_identifier, options.timeout) {
            rtts.push(rtt);
        }

        if seq + 1 < options.count {
            thread::sleep(options.interval);
        }
    }

    socket.close();
    Ok(Host::new(destination, options.count, rtts))
}

/// Receives with `timeout`, discarding replies that don't match `(identifier,
/// sequence)`, until a match arrives or the deadline expires. Returns the
/// RTT in milliseconds for a matching Echo Reply; `None` for a timeout or
/// for an ICMP error reply (both count as "no reply for this seq").
fn wait_for_matching_reply(
    socket: &mut IcmpSocket,
    request: &EchoRequest,
    match_identifier: u16,
    timeout: Duration,
) -> Option<f64> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match socket.receive(remaining) {
            Ok(reply) => {
                if reply.identifier != match_identifier || reply.sequence != request.sequence {
                    trace!(
                        got_id = reply.identifier,
                        got_seq = reply.sequence,
                        "discarding unmatched reply"
                    );
                    continue;
                }
                if reply.raise_for_status().is_err() {
                    return None;
                }
                let send_time = request.send_time?;
                let rtt = reply.receive_time.saturating_duration_since(send_time);
                return Some(rtt.as_secs_f64() * 1000.0);
            }
            Err(SocketError::TimeoutExceeded) => return None,
            Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_spec_defaults() {
        let options = PingOptions::default();
        assert_eq!(options.count, 4);
        assert_eq!(options.payload_size, DEFAULT_PAYLOAD_SIZE);
        assert_eq!(options.ttl, 64);
        assert!(!options.privileged);
    }
}
