//! Socket layer: abstracts over privileged (raw) and unprivileged
//! (datagram) ICMP sockets, for both address families, covering the full
//! `(family, privileged)` matrix. The receive loop recomputes its
//! remaining timeout every iteration rather than trusting a single
//! blocking read, so a spurious wakeup can't silently extend the deadline.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket as RawSocket, Type};
use tracing::{debug, trace, warn};

use crate::error::SocketError;
use crate::icmp::{self, Icmpv4, Icmpv6};
use crate::reply::EchoReply;
use crate::request::{EchoRequest, Family};

/// Wire buffer big enough for an IPv4 header + ICMP header + a generous
/// payload; grown on demand by `receive` if a single read doesn't fit.
const RECV_BUFFER_SIZE: usize = 4096;

pub struct IcmpSocket {
    inner: RawSocket,
    family: Family,
    privileged: bool,
    source: Option<IpAddr>,
    /// Set once the first send reveals the kernel-assigned identifier
    /// (unprivileged datagram sockets only).
    bound_identifier: Option<u16>,
    closed: bool,
    broadcast: bool,
}

impl IcmpSocket {
    pub fn open(family: Family, privileged: bool, source: Option<IpAddr>) -> Result<Self, SocketError> {
        let domain = match family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        };
        let (ty, protocol) = match (family, privileged) {
            (Family::V4, true) => (Type::RAW, Protocol::ICMPV4),
            (Family::V4, false) => (Type::DGRAM, Protocol::ICMPV4),
            (Family::V6, true) => (Type::RAW, Protocol::ICMPV6),
            (Family::V6, false) => (Type::DGRAM, Protocol::ICMPV6),
        };

        let inner = RawSocket::new(domain, ty, Some(protocol)).map_err(|err| {
            map_construction_error(err, privileged)
        })?;

        if let Some(src) = source {
            let addr: SockAddr = SocketAddr::new(src, 0).into();
            inner.bind(&addr).map_err(SocketError::AddressError)?;
        }

        debug!(?family, privileged, ?source, "opened icmp socket");

        Ok(Self {
            inner,
            family,
            privileged,
            source,
            bound_identifier: None,
            closed: false,
            broadcast: false,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn source(&self) -> Option<IpAddr> {
        self.source
    }

    /// The identifier the kernel assigned on an unprivileged socket, once
    /// known.
    pub fn bound_identifier(&self) -> Option<u16> {
        self.bound_identifier
    }

    pub fn broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn set_broadcast(&mut self, enabled: bool) -> Result<(), SocketError> {
        if self.family != Family::V4 {
            return Ok(());
        }
        self.inner.set_broadcast(enabled)?;
        self.broadcast = enabled;
        Ok(())
    }

    /// Raw file descriptor, exposed for the async layer to wrap in an
    /// `AsyncFd`.
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.inner.as_raw_fd()
    }

    pub fn send(&mut self, request: &mut EchoRequest) -> Result<(), SocketError> {
        if self.closed {
            return Err(SocketError::UnavailableError);
        }

        let dest = SocketAddr::new(request.destination, 0);
        if dest.is_ipv4() && is_broadcast_v4(&request.destination) && !self.broadcast {
            return Err(SocketError::BroadcastError);
        }

        let ttl = request.ttl;
        let traffic_class = request.traffic_class;
        match self.family {
            Family::V4 => {
                self.inner.set_ttl(u32::from(ttl))?;
                #[cfg(unix)]
                if traffic_class != 0 {
                    self.inner.set_tos(u32::from(traffic_class))?;
                }
            }
            Family::V6 => {
                self.inner.set_unicast_hops_v6(u32::from(ttl))?;
                #[cfg(unix)]
                if traffic_class != 0 {
                    self.inner.set_tclass_v6(u32::from(traffic_class))?;
                }
            }
        }

        let identifier = request.identifier;
        let sequence = request.sequence;
        let compute_checksum = self.privileged && self.family == Family::V4;
        let payload = request.payload().to_vec();

        let mut buffer = vec![0u8; icmp::HEADER_SIZE + payload.len()];
        let wire_request = icmp::EchoWireRequest {
            ident: identifier,
            seq: sequence,
            payload: &payload,
        };
        match self.family {
            Family::V4 => wire_request.encode::<Icmpv4>(&mut buffer, compute_checksum),
            Family::V6 => wire_request.encode::<Icmpv6>(&mut buffer, compute_checksum),
        }

        let addr: SockAddr = match (request.destination, request.zone) {
            (IpAddr::V6(v6), Some(scope_id)) => {
                SocketAddr::V6(std::net::SocketAddrV6::new(v6, 0, 0, scope_id)).into()
            }
            _ => dest.into(),
        };

        self.inner.send_to(&buffer, &addr).map_err(SocketError::Other)?;

        request.send_time = Some(Instant::now());

        if !self.privileged && self.bound_identifier.is_none() {
            self.bound_identifier = read_bound_identifier(&self.inner, self.family);
        }

        trace!(identifier, sequence, bytes = buffer.len(), "sent icmp echo request");
        Ok(())
    }

    /// Waits up to `timeout` for any ICMP datagram, recomputing the
    /// remaining time on each loop iteration so spurious wakeups can't
    /// extend the effective deadline.
    pub fn receive(&mut self, timeout: Duration) -> Result<EchoReply, SocketError> {
        if self.closed {
            return Err(SocketError::UnavailableError);
        }

        let deadline = Instant::now() + timeout;
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SocketError::TimeoutExceeded);
            }
            self.inner.set_read_timeout(Some(remaining))?;

            let (n, from) = match self.recv_from(&mut buffer) {
                Ok(pair) => pair,
                Err(err) if is_would_block(&err) => continue,
                Err(err) => return Err(SocketError::Other(err)),
            };
            let receive_time = Instant::now();

            let (icmp_payload, ttl_hint) = match self.family {
                Family::V4 => match crate::ip::IpV4Packet::decode(&buffer[..n]) {
                    Ok(pkt) => (pkt.data, Some(pkt.ttl)),
                    Err(_) => {
                        warn!("dropped malformed ipv4 packet");
                        continue;
                    }
                },
                Family::V6 => (&buffer[..n], None),
            };
            let _ = ttl_hint;

            let decoded = match self.family {
                Family::V4 => crate::icmp::parse::decode::<Icmpv4>(icmp_payload),
                Family::V6 => crate::icmp::parse::decode::<Icmpv6>(icmp_payload),
            };

            let decoded = match decoded {
                Ok(decoded) => decoded,
                Err(_) => {
                    warn!("dropped invalid icmp packet");
                    continue;
                }
            };

            return Ok(EchoReply {
                source: from,
                family: self.family,
                identifier: decoded.ident,
                sequence: decoded.seq,
                icmp_type: decoded.icmp_type,
                icmp_code: decoded.icmp_code,
                bytes_received: n,
                receive_time,
            });
        }
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        // socket2's recv_from wants `&mut [MaybeUninit<u8>]`; a plain byte
        // buffer is always init, so the unsafe cast is sound.
        let uninit = unsafe {
            &mut *(buffer as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        };
        let (n, addr) = self.inner.recv_from(uninit)?;
        let ip = addr
            .as_socket()
            .map(|s| s.ip())
            .unwrap_or_else(|| match self.family {
                Family::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                Family::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
            });
        Ok((n, ip))
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(family = ?self.family, "closed icmp socket");
        }
    }
}

impl Drop for IcmpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_broadcast_v4(addr: &IpAddr) -> bool {
    matches!(addr, IpAddr::V4(v4) if *v4 == std::net::Ipv4Addr::BROADCAST)
}

fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

fn map_construction_error(err: io::Error, privileged: bool) -> SocketError {
    match err.raw_os_error() {
        Some(code) if code == libc_eacces() || code == libc_eperm() => {
            let hint = if !privileged {
                Some(
                    "unprivileged ICMP datagram sockets may be disabled; see net.ipv4.ping_group_range"
                        .to_string(),
                )
            } else {
                None
            };
            SocketError::PermissionError { hint, source: err }
        }
        _ => SocketError::Other(err),
    }
}

#[cfg(unix)]
fn libc_eacces() -> i32 {
    13
}
#[cfg(unix)]
fn libc_eperm() -> i32 {
    1
}
#[cfg(not(unix))]
fn libc_eacces() -> i32 {
    -1
}
#[cfg(not(unix))]
fn libc_eperm() -> i32 {
    -1
}

/// Retrieves the kernel-assigned identifier of an unprivileged datagram
/// socket via `getsockname`.
fn read_bound_identifier(socket: &RawSocket, family: Family) -> Option<u16> {
    let local = socket.local_addr().ok()?;
    let socket_addr = local.as_socket()?;
    match (family, socket_addr) {
        (Family::V4, SocketAddr::V4(v4)) => Some(v4.port()),
        (Family::V6, SocketAddr::V6(v6)) => Some(v6.port()),
        _ => None,
    }
}
