//! Concurrent multi-host ping scheduler: one OS thread per address family
//! actually in use (at most two), each thread owning a single socket and
//! interleaving sends to every destination of that family, correlating
//! replies back to a destination slot by `(identifier, sequence)`.
//!
//! Simplification recorded in DESIGN.md: each family thread applies the
//! full `concurrent_tasks` cap independently rather than sharing one
//! cross-thread counter with the other family's thread. The two sockets
//! are already a hard upper bound of two OS threads, and nothing here
//! depends on the two caps summing to exactly `concurrent_tasks`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::LibError;
use crate::request::{EchoRequest, Family, DEFAULT_PAYLOAD_SIZE};
use crate::resolve;
use crate::socket::IcmpSocket;
use crate::stats::Host;

#[derive(Debug, Clone)]
pub struct MultipingOptions {
    pub count: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub concurrent_tasks: usize,
    pub privileged: bool,
    pub payload_size: usize,
    pub ttl: u8,
    pub traffic_class: u8,
}

impl Default for MultipingOptions {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
            concurrent_tasks: 50,
            privileged: false,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            ttl: 64,
            traffic_class: 0,
        }
    }
}

/// Pings every address in `addresses` concurrently. The returned `Vec<Host>`
/// is in exactly the input order, regardless of reply arrival order.
pub fn multiping(addresses: &[&str], options: &MultipingOptions) -> Result<Vec<Host>, LibError> {
    let mut targets: Vec<(usize, IpAddr)> = Vec::with_capacity(addresses.len());
    for (index, address) in addresses.iter().enumerate() {
        let resolved = resolve::resolve(address, None)?;
        targets.push((index, resolved[0]));
    }

    let mut by_family: HashMap<Family, Vec<(usize, IpAddr)>> = HashMap::new();
    for (index, addr) in targets {
        by_family.entry(Family::of(&addr)).or_default().push((index, addr));
    }

    let mut results: Vec<Option<Host>> = vec![None; addresses.len()];

    let handles: Vec<_> = by_family
        .into_iter()
        .map(|(family, members)| {
            let options = options.clone();
            thread::spawn(move || run_family_scheduler(family, members, options))
        })
        .collect();

    for handle in handles {
        let partial = handle
            .join()
            .map_err(|_| LibError::SocketError(crate::error::SocketError::UnavailableError))??;
        for (index, host) in partial {
            results[index] = Some(host);
        }
    }

    Ok(results.into_iter().map(|h| h.expect("every target scheduled")).collect())
}

struct DestSlot {
    index: usize,
    address: IpAddr,
    identifier: u16,
    sent: u32,
    rtts: Vec<f64>,
    next_send_at: Instant,
    outstanding: Option<Outstanding>,
}

struct Outstanding {
    sequence: u16,
    send_time: Instant,
    expires_at: Instant,
}

fn run_family_scheduler(
    family: Family,
    members: Vec<(usize, IpAddr)>,
    options: MultipingOptions,
) -> Result<Vec<(usize, Host)>, LibError> {
    let mut socket = IcmpSocket::open(family, options.privileged, None)?;
    let now = Instant::now();
    let mut base_identifier = process::id() as u16;
    // Unprivileged sockets share one kernel-assigned identifier across every
    // destination on this thread (set once on the first successful send), so
    // per-destination sequence numbers alone would collide. A sequence
    // counter shared across all destinations on this socket keeps every
    // outstanding (identifier, sequence) pair unique regardless of whether
    // the identifier ends up shared.
    let mut next_sequence: u16 = 0;

    let mut slots: Vec<DestSlot> = members
        .into_iter()
        .map(|(index, address)| {
            let identifier = base_identifier;
            base_identifier = base_identifier.wrapping_add(1);
            DestSlot {
                index,
                address,
                identifier,
                sent: 0,
                rtts: Vec::new(),
                next_send_at: now,
                outstanding: None,
            }
        })
        .collect();

    // (identifier, sequence) -> position in `slots`
    let mut in_flight: HashMap<(u16, u16), usize> = HashMap::new();
    let global_timeout_deadline = now + options.timeout.max(options.interval * options.count);

    loop {
        if slots
            .iter()
            .all(|s| s.outstanding.is_none() && s.sent >= options.count)
        {
            break;
        }

        let active = in_flight.len();
        if active < options.concurrent_tasks {
            for position in 0..slots.len() {
                if in_flight.len() >= options.concurrent_tasks {
                    break;
                }
                let ready = {
                    let slot = &slots[position];
                    slot.outstanding.is_none()
                        && slot.sent < options.count
                        && Instant::now() >= slot.next_send_at
                };
                if !ready {
                    continue;
                }

                let slot = &mut slots[position];
                let sequence = next_sequence;
                next_sequence = next_sequence.wrapping_add(1);
                let mut request = EchoRequest::new(slot.address, slot.identifier, sequence)
                    .with_ttl(options.ttl)
                    .with_traffic_class(options.traffic_class)
                    .with_payload_size(options.payload_size);

                match socket.send(&mut request) {
                    Ok(()) => {
                        let send_time = request.send_time.unwrap_or_else(Instant::now);
                        let match_identifier = socket.bound_identifier().unwrap_or(slot.identifier);
                        slot.identifier = match_identifier;
                        slot.outstanding = Some(Outstanding {
                            sequence,
                            send_time,
                            expires_at: send_time + options.timeout,
                        });
                        slot.sent += 1;
                        slot.next_send_at = send_time + options.interval;
                        in_flight.insert((match_identifier, sequence), position);
                        trace!(index = slot.index, sequence, "multiping probe sent");
                    }
                    Err(err) => {
                        debug!(?err, index = slot.index, "multiping send failed");
                        slot.sent += 1;
                        slot.next_send_at = Instant::now() + options.interval;
                    }
                }
            }
        }

        let nearest_send = slots
            .iter()
            .filter(|s| s.outstanding.is_none() && s.sent < options.count)
            .map(|s| s.next_send_at)
            .min();
        let nearest_expiry = slots
            .iter()
            .filter_map(|s| s.outstanding.as_ref())
            .map(|o| o.expires_at)
            .min();

        let deadline = [nearest_send, nearest_expiry, Some(global_timeout_deadline)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(global_timeout_deadline);
        let wait = deadline.saturating_duration_since(Instant::now());

        if wait.is_zero() {
            reap_expired(&mut slots, &mut in_flight);
            if Instant::now() >= global_timeout_deadline
                && slots.iter().all(|s| s.outstanding.is_none())
            {
                break;
            }
            continue;
        }

        match socket.receive(wait) {
            Ok(reply) => {
                if let Some(&position) = in_flight.get(&(reply.identifier, reply.sequence)) {
                    if reply.raise_for_status().is_ok() {
                        let slot = &mut slots[position];
                        if let Some(outstanding) = slot.outstanding.take() {
                            let rtt = reply
                                .receive_time
                                .saturating_duration_since(outstanding.send_time)
                                .as_secs_f64()
                                * 1000.0;
                            slot.rtts.push(rtt);
                        }
                        in_flight.remove(&(reply.identifier, reply.sequence));
                    } else {
                        slots[position].outstanding = None;
                        in_flight.remove(&(reply.identifier, reply.sequence));
                    }
                }
                // Unknown (identifier, sequence) replies are discarded.
            }
            Err(_) => {
                reap_expired(&mut slots, &mut in_flight);
            }
        }
    }

    Ok(slots
        .into_iter()
        .map(|slot| {
            let sent = slot.sent;
            (slot.index, Host::new(slot.address, sent, slot.rtts))
        })
        .collect())
}

fn reap_expired(slots: &mut [DestSlot], in_flight: &mut HashMap<(u16, u16), usize>) {
    let now = Instant::now();
    for (position, slot) in slots.iter_mut().enumerate() {
        if let Some(outstanding) = &slot.outstanding {
            if now >= outstanding.expires_at {
                in_flight.remove(&(slot.identifier, outstanding.sequence));
                slot.outstanding = None;
                let _ = position;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_matches_spec() {
        assert_eq!(MultipingOptions::default().concurrent_tasks, 50);
    }

    #[test]
    fn shared_identifier_still_yields_unique_correlation_keys() {
        // On an unprivileged socket, every destination of a family ends up
        // with the same kernel-assigned identifier once it's bound. The
        // scheduler's shared sequence counter must still hand out a unique
        // (identifier, sequence) pair per send, across all destinations.
        let identifier = 4242u16;
        let mut next_sequence: u16 = 0;
        let mut seen = HashMap::new();
        for destination in 0..3 {
            for _probe in 0..4 {
                let sequence = next_sequence;
                next_sequence = next_sequence.wrapping_add(1);
                assert!(
                    seen.insert((identifier, sequence), destination).is_none(),
                    "collision on (identifier, sequence) = ({identifier}, {sequence})"
                );
            }
        }
    }
}
