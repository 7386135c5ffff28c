//! Traceroute engine: a TTL-sweeping state machine built on the same
//! socket/codec primitives as `ping.rs`. One socket serves every hop, with
//! a monotonically increasing sequence number across the whole run so a
//! late reply from an earlier TTL can never be mistaken for the current
//! probe. Address variation within one TTL is folded into the first
//! responder — multi-path display isn't supported.

use std::net::IpAddr;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{LibError, SocketError};
use crate::request::{EchoRequest, Family, DEFAULT_PAYLOAD_SIZE};
use crate::resolve;
use crate::socket::IcmpSocket;
use crate::stats::Hop;

#[derive(Debug, Clone)]
pub struct TracerouteOptions {
    pub first_hop: u8,
    pub max_hops: u8,
    pub count: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub fast: bool,
    pub payload_size: usize,
    pub traffic_class: u8,
}

impl Default for TracerouteOptions {
    fn default() -> Self {
        Self {
            first_hop: 1,
            max_hops: 30,
            count: 3,
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(2),
            fast: false,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            traffic_class: 0,
        }
    }
}

/// Traces the path to `address`, returning one [`Hop`] per TTL that
/// produced at least one response, sorted ascending by `distance` (spec
/// §4.5, §8). Requires a privileged socket to observe Time Exceeded.
pub fn traceroute(address: &str, options: &TracerouteOptions) -> Result<Vec<Hop>, LibError> {
    let candidates = resolve::resolve(address, None)?;
    let destination = candidates[0];
    let family = Family::of(&destination);

    let mut socket = IcmpSocket::open(family, true, None)?;
    let identifier = process::id() as u16;
    let mut sequence: u16 = 0;

    let mut hops = Vec::new();

    'hops: for ttl in options.first_hop..=options.max_hops {
        let mut first_responder: Option<IpAddr> = None;
        let mut rtts = Vec::new();
        let mut destination_reached = false;

        for probe in 0..options.count {
            let mut request = EchoRequest::new(destination, identifier, sequence)
                .with_ttl(ttl)
                .with_traffic_class(options.traffic_class)
                .with_payload_size(options.payload_size);

            if socket.send(&mut request).is_ok() {
                let send_time = request.send_time.expect("send_time set on successful send");
                if let Some(outcome) =
                    wait_for_hop_reply(&mut socket, identifier, sequence, send_time, options.timeout)
                {
                    let responder = *first_responder.get_or_insert(outcome.source);
                    trace!(ttl, probe, %responder, rtt = outcome.rtt_ms, "traceroute hop response");
                    rtts.push(outcome.rtt_ms);
                    if outcome.is_destination {
                        destination_reached = true;
                    }
                }
            }

            sequence = sequence.wrapping_add(1);

            if options.fast && first_responder.is_some() {
                break;
            }
            if probe + 1 < options.count {
                thread::sleep(options.interval);
            }
        }

        if let Some(address) = first_responder {
            let sent = rtts.len() as u32;
            hops.push(Hop::new(ttl, address, sent, rtts));
        }

        if destination_reached {
            break 'hops;
        }
    }

    socket.close();
    Ok(hops)
}

struct HopOutcome {
    source: IpAddr,
    rtt_ms: f64,
    is_destination: bool,
}

fn wait_for_hop_reply(
    socket: &mut IcmpSocket,
    identifier: u16,
    sequence: u16,
    send_time: Instant,
    timeout: Duration,
) -> Option<HopOutcome> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match socket.receive(remaining) {
            Ok(reply) => {
                if reply.identifier != identifier || reply.sequence != sequence {
                    continue;
                }
                let rtt_ms = reply.receive_time.saturating_duration_since(send_time).as_secs_f64() * 1000.0;
                return Some(HopOutcome {
                    source: reply.source,
                    rtt_ms,
                    is_destination: reply.is_echo_reply(),
                });
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
    fn defaults_match_common_traceroute_conventions() {
        let options = TracerouteOptions::default();
        assert_eq!(options.first_hop, 1);
        assert_eq!(options.max_hops, 30);
    }
}
