//! Parsing of incoming ICMP datagrams, including extraction of the embedded
//! original request from error messages (Destination Unreachable, Time
//! Exceeded, Redirect).
//!
//! Per RFC 792 §3 / RFC 4443 §3 ("Internet Header + 64 bits of Original
//! Data Datagram" / "As much of invoking packet as possible"), an ICMP
//! error's payload is an embedded IP header followed by the first bytes of
//! the ICMP packet that triggered the error — enough to read that inner
//! packet's identifier and sequence number.

use crate::error::DecodeError;
use crate::icmp::{EchoWireReply, Proto, HEADER_SIZE};

/// A decoded incoming ICMP message, still wire-level (no timestamps, no
/// source address — those are filled in by the socket layer).
pub struct Decoded {
    pub icmp_type: u8,
    pub icmp_code: u8,
    /// Identifier/sequence of the echo this message correlates to: read
    /// directly from an Echo Reply, or extracted from the embedded
    /// original datagram of an error message. `(0, 0)` if extraction
    /// failed for lack of bytes.
    pub ident: u16,
    pub seq: u16,
}

/// Decodes `icmp_payload`, which for IPv6 is exactly the ICMP message and
/// for IPv4 is the ICMP message with the IP header already stripped by the
/// caller (see `socket.rs`).
pub fn decode<P: Proto>(icmp_payload: &[u8]) -> Result<Decoded, DecodeError> {
    let header = EchoWireReply::decode(icmp_payload).ok_or(DecodeError::InvalidPacket)?;

    if header.icmp_type == P::ECHO_REPLY_TYPE {
        return Ok(Decoded {
            icmp_type: header.icmp_type,
            icmp_code: header.icmp_code,
            ident: header.ident,
            seq: header.seq,
        });
    }

    if P::ERROR_TYPES.contains(&header.icmp_type) {
        let (ident, seq) = extract_embedded_echo::<P>(header.payload).unwrap_or((0, 0));
        return Ok(Decoded {
            icmp_type: header.icmp_type,
            icmp_code: header.icmp_code,
            ident,
            seq,
        });
    }

    // Message type this library doesn't model (out of scope per spec
    // non-goals); still report type/code so raise_for_status can surface it.
    Ok(Decoded {
        icmp_type: header.icmp_type,
        icmp_code: header.icmp_code,
        ident: 0,
        seq: 0,
    })
}

/// `error_payload` is "embedded IP header + first bytes of the offending
/// ICMP packet". Skips the embedded IP header, then reads id+seq at
/// offsets 4..8 of the embedded ICMP header.
fn extract_embedded_echo<P: Proto>(error_payload: &[u8]) -> Option<(u16, u16)> {
    if error_payload.is_empty() {
        return None;
    }
    let ip_header_len = P::embedded_ip_header_len(error_payload[0]);
    let embedded = error_payload.get(ip_header_len..)?;
    if embedded.len() < HEADER_SIZE {
        return None;
    }
    Some((
        u16::from_be_bytes([embedded[4], embedded[5]]),
        u16::from_be_bytes([embedded[6], embedded[7]]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::{Icmpv4, Icmpv6};

    fn embedded_v4_echo(ident: u16, seq: u16) -> Vec<u8> {
        // 20-byte minimal IPv4 header + 8-byte ICMP echo header.
        let mut buf = vec![0u8; 20 + HEADER_SIZE];
        buf[0] = 0x45;
        buf[9] = 1; // protocol ICMP
        buf[20] = Icmpv4::ECHO_REQUEST_TYPE;
        buf[20 + 4..20 + 6].copy_from_slice(&ident.to_be_bytes());
        buf[20 + 6..20 + 8].copy_from_slice(&seq.to_be_bytes());
        buf
    }

    #[test]
    fn extracts_id_seq_from_time_exceeded() {
        let mut msg = vec![0u8; HEADER_SIZE];
        msg[0] = 11; // Time Exceeded
        msg[1] = 0;
        msg.extend(embedded_v4_echo(0xBEEF, 7));

        let decoded = decode::<Icmpv4>(&msg).unwrap();
        assert_eq!(decoded.icmp_type, 11);
        assert_eq!(decoded.ident, 0xBEEF);
        assert_eq!(decoded.seq, 7);
    }

    #[test]
    fn short_embedded_payload_is_unmatchable_not_an_error() {
        let mut msg = vec![0u8; HEADER_SIZE];
        msg[0] = 3; // Destination Unreachable
        msg.extend([0u8; 4]); // far too short to contain an IP header

        let decoded = decode::<Icmpv4>(&msg).unwrap();
        assert_eq!(decoded.ident, 0);
        assert_eq!(decoded.seq, 0);
    }

    #[test]
    fn echo_reply_reads_ident_seq_directly() {
        let mut msg = vec![0u8; HEADER_SIZE];
        msg[0] = Icmpv6::ECHO_REPLY_TYPE;
        msg[4..6].copy_from_slice(&1u16.to_be_bytes());
        msg[6..8].copy_from_slice(&2u16.to_be_bytes());

        let decoded = decode::<Icmpv6>(&msg).unwrap();
        assert_eq!(decoded.ident, 1);
        assert_eq!(decoded.seq, 2);
    }

    #[test]
    fn too_short_is_invalid_packet() {
        assert!(decode::<Icmpv4>(&[0u8; 4]).is_err());
    }
}
