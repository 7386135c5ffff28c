//! High-level outbound request descriptor, distinct from the wire codec in
//! `icmp::echo` — this is the typed value callers build and the socket
//! layer stamps with a send timestamp.

use std::net::IpAddr;
use std::time::Instant;

use rand::RngCore;

/// Default payload length (bytes) when the caller supplies neither an
/// explicit payload nor a size.
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// IP address family, used at the Rust API boundary instead of bare `4`/`6`
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Family {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }
}

/// An outbound Echo Request, the domain-model form of the thing
/// `ping`/`multiping`/`traceroute` build and send.
///
/// `identifier`/`sequence` are preserved verbatim on privileged sockets; on
/// unprivileged sockets the kernel substitutes the identifier, so the
/// socket layer's return value (not this struct) is authoritative for
/// matching once a send has happened.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub destination: IpAddr,
    /// IPv6 zone index (scope id) for link-local destinations.
    pub zone: Option<u32>,
    pub identifier: u16,
    pub sequence: u16,
    payload: Payload,
    pub ttl: u8,
    pub traffic_class: u8,
    /// Written exactly once by the socket on successful send.
    pub send_time: Option<Instant>,
}

#[derive(Debug, Clone)]
enum Payload {
    Explicit(Vec<u8>),
    /// Random payload, generated lazily and cached the first time it's read.
    Random { size: usize, generated: Option<Vec<u8>> },
}

impl EchoRequest {
    pub fn new(destination: IpAddr, identifier: u16, sequence: u16) -> Self {
        Self {
            destination,
            zone: None,
            identifier,
            sequence,
            payload: Payload::Random {
                size: DEFAULT_PAYLOAD_SIZE,
                generated: None,
            },
            ttl: 64,
            traffic_class: 0,
            send_time: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Payload::Explicit(payload);
        self
    }

    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload = Payload::Random {
            size,
            generated: None,
        };
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    pub fn with_zone(mut self, zone: Option<u32>) -> Self {
        self.zone = zone;
        self
    }

    /// Returns the payload bytes, generating and caching a random payload
    /// on first access if none was supplied explicitly. Stable and
    /// retrievable thereafter.
    pub fn payload(&mut self) -> &[u8] {
        match &mut self.payload {
            Payload::Explicit(bytes) => bytes,
            Payload::Random { size, generated } => {
                if generated.is_none() {
                    let mut bytes = vec![0u8; *size];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    *generated = Some(bytes);
                }
                generated.as_ref().unwrap()
            }
        }
    }

    pub fn family(&self) -> Family {
        Family::of(&self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn random_payload_is_stable_once_generated() {
        let mut req = EchoRequest::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, 1).with_payload_size(16);
        let first = req.payload().to_vec();
        let second = req.payload().to_vec();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
    }

    #[test]
    fn payload_size_zero_is_accepted() {
        let mut req = EchoRequest::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, 1).with_payload_size(0);
        assert_eq!(req.payload().len(), 0);
    }

    #[test]
    fn explicit_payload_is_used_verbatim() {
        let mut req =
            EchoRequest::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, 1).with_payload(vec![9, 9, 9]);
        assert_eq!(req.payload(), &[9, 9, 9]);
    }
}
