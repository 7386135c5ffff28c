//! Echo Request/Reply wire layout (RFC 792 §3.6 / RFC 4443 §4.1-4.2):
//!
//! ```text
//! | type(1) | code(1) | checksum(2) | identifier(2) | sequence(2) | payload... |
//! ```
//!
//! One implementation serves both ICMPv4 and ICMPv6 via [`Proto`]. The
//! checksum write is conditional: raw IPv4 sockets compute it in
//! userspace, every other socket kind leaves it to the kernel.

use super::{write_checksum, Proto, HEADER_SIZE};

/// Marker for "this type has a wire encoding", kept so call sites read
/// `EchoWireRequest::encode::<Icmpv4>` rather than a bare free function.
pub trait EchoWire: Proto {}
impl<P: Proto> EchoWire for P {}

pub struct EchoWireRequest<'a> {
    pub ident: u16,
    pub seq: u16,
    pub payload: &'a [u8],
}

impl<'a> EchoWireRequest<'a> {
    /// Encodes into `buffer`, which must be at least `HEADER_SIZE +
    /// payload.len()` bytes. When `compute_checksum` is false the checksum
    /// field is left zeroed for the kernel or NIC to fill in.
    pub fn encode<P: EchoWire>(&self, buffer: &mut [u8], compute_checksum: bool) {
        buffer[0] = P::ECHO_REQUEST_TYPE;
        buffer[1] = P::ECHO_REQUEST_CODE;
        buffer[2] = 0;
        buffer[3] = 0;
        buffer[4..6].copy_from_slice(&self.ident.to_be_bytes());
        buffer[6..8].copy_from_slice(&self.seq.to_be_bytes());
        buffer[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(self.payload);

        if compute_checksum {
            write_checksum(&mut buffer[..HEADER_SIZE + self.payload.len()]);
        }
    }
}

/// A decoded ICMP message header, without any type/code validation — used
/// both for the top-level reply and, during error-message parsing, for the
/// embedded original Echo Request header (see `parse.rs`).
#[derive(Debug, Clone, Copy)]
pub struct EchoWireReply<'a> {
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub ident: u16,
    pub seq: u16,
    pub payload: &'a [u8],
}

impl<'a> EchoWireReply<'a> {
    pub fn decode(buffer: &'a [u8]) -> Option<Self> {
        if buffer.len() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            icmp_type: buffer[0],
            icmp_code: buffer[1],
            ident: u16::from_be_bytes([buffer[4], buffer[5]]),
            seq: u16::from_be_bytes([buffer[6], buffer[7]]),
            payload: &buffer[HEADER_SIZE..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::Icmpv4;

    #[test]
    fn round_trips_identifier_and_sequence() {
        let payload = [1u8, 2, 3, 4];
        let req = EchoWireRequest {
            ident: 0x1234,
            seq: 0x0001,
            payload: &payload,
        };
        let mut buf = vec![0u8; HEADER_SIZE + payload.len()];
        req.encode::<Icmpv4>(&mut buf, true);

        // Pretend it came back unmodified as an Echo Reply.
        buf[0] = Icmpv4::ECHO_REPLY_TYPE;
        let reply = EchoWireReply::decode(&buf).unwrap();
        assert_eq!(reply.ident, 0x1234);
        assert_eq!(reply.seq, 0x0001);
        assert_eq!(reply.payload, &payload);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(EchoWireReply::decode(&[0u8; 4]).is_none());
    }
}
