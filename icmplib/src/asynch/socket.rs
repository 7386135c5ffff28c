//! Non-blocking socket wrapper, used only by [`super::listener`].
//!
//! One socket per family, built on `tokio::io::unix::AsyncFd` around a
//! non-blocking `socket2::Socket` — the standard way to drive a raw fd
//! from tokio without a dedicated blocking thread per send/receive.

use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Instant;

use socket2::{Domain, Protocol, SockAddr, Socket as RawSocket, Type};
use tokio::io::unix::AsyncFd;
use tracing::{trace, warn};

use crate::error::SocketError;
use crate::icmp::{self, Icmpv4, Icmpv6};
use crate::reply::EchoReply;
use crate::request::{EchoRequest, Family};

struct NonBlockingSocket(RawSocket);

impl AsRawFd for NonBlockingSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

pub struct AsyncIcmpSocket {
    inner: AsyncFd<NonBlockingSocket>,
    family: Family,
    privileged: bool,
}

impl AsyncIcmpSocket {
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

        let socket = RawSocket::new(domain, ty, Some(protocol)).map_err(SocketError::Other)?;
        socket.set_nonblocking(true)?;

        if let Some(src) = source {
            let addr: SockAddr = std::net::SocketAddr::new(src, 0).into();
            socket.bind(&addr).map_err(SocketError::AddressError)?;
        }

        let inner = AsyncFd::new(NonBlockingSocket(socket)).map_err(SocketError::Other)?;
        Ok(Self {
            inner,
            family,
            privileged,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn bound_identifier(&self) -> Option<u16> {
        let local = self.inner.get_ref().0.local_addr().ok()?;
        let socket_addr = local.as_socket()?;
        match (self.family, socket_addr) {
            (Family::V4, std::net::SocketAddr::V4(v4)) => Some(v4.port()),
            (Family::V6, std::net::SocketAddr::V6(v6)) => Some(v6.port()),
            _ => None,
        }
    }

    pub async fn send(&self, request: &mut EchoRequest) -> Result<(), SocketError> {
        let ttl = request.ttl;
        match self.family {
            Family::V4 => self.inner.get_ref().0.set_ttl(u32::from(ttl))?,
            Family::V6 => self.inner.get_ref().0.set_unicast_hops_v6(u32::from(ttl))?,
        }

        let compute_checksum = self.privileged && self.family == Family::V4;
        let identifier = request.identifier;
        let sequence = request.sequence;
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

        let addr: SockAddr = std::net::SocketAddr::new(request.destination, 0).into();

        loop {
            let mut guard = self.inner.writable().await.map_err(SocketError::Other)?;
            match guard.try_io(|inner| inner.get_ref().0.send_to(&buffer, &addr)) {
                Ok(Ok(_)) => {
                    request.send_time = Some(Instant::now());
                    trace!(identifier, sequence, "sent icmp echo request (async)");
                    return Ok(());
                }
                Ok(Err(err)) => return Err(SocketError::Other(err)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Waits for the next ICMP datagram of any kind and decodes it.
    /// Malformed or undecodable datagrams are dropped and the wait
    /// continues, mirroring the synchronous socket's `receive` loop.
    pub async fn recv(&self) -> Result<EchoReply, SocketError> {
        let mut buffer = [0u8; 4096];
        loop {
            let mut guard = self.inner.readable().await.map_err(SocketError::Other)?;
            let result = guard.try_io(|inner| {
                let uninit = unsafe {
                    &mut *(&mut buffer as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
                };
                let (n, addr) = inner.get_ref().0.recv_from(uninit)?;
                let ip = addr.as_socket().map(|s| s.ip()).unwrap_or(match self.family {
                    Family::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                    Family::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
                });
                Ok((n, ip))
            });

            let (n, from) = match result {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => return Err(SocketError::Other(err)),
                Err(_would_block) => continue,
            };
            let receive_time = Instant::now();

            let icmp_payload = match self.family {
                Family::V4 => match crate::ip::IpV4Packet::decode(&buffer[..n]) {
                    Ok(pkt) => pkt.data,
                    Err(_) => {
                        warn!("dropped malformed ipv4 packet");
                        continue;
                    }
                },
                Family::V6 => &buffer[..n],
            };

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
}
