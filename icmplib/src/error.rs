//! Error taxonomy: small `thiserror`-derived leaf enums per concern,
//! composed into one top-level [`LibError`] via `#[from]`.

use std::io;

use thiserror::Error;

use crate::reply::EchoReply;

/// Errors raised while opening, configuring, or using a socket.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("could not bind source address: {0}")]
    AddressError(#[source] io::Error),

    #[error("insufficient privilege to open this socket kind{}", hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default())]
    PermissionError { hint: Option<String>, source: io::Error },

    #[error("socket is closed")]
    UnavailableError,

    #[error("destination is a broadcast address but the broadcast flag is not set")]
    BroadcastError,

    #[error("timed out waiting for a reply")]
    TimeoutExceeded,

    #[error("socket error: {0}")]
    Other(#[from] io::Error),
}

/// Errors surfaced when a reply turns out to be an ICMP error message.
#[derive(Debug, Error)]
pub enum IcmpError {
    #[error("destination unreachable (code {}): {reply:?}", reply.icmp_code)]
    DestinationUnreachable { reply: EchoReply },

    #[error("time exceeded (code {}): {reply:?}", reply.icmp_code)]
    TimeExceeded { reply: EchoReply },

    #[error("unexpected ICMP type {} code {}: {reply:?}", reply.icmp_type, reply.icmp_code)]
    Other { reply: EchoReply },
}

impl IcmpError {
    pub fn reply(&self) -> &EchoReply {
        match self {
            IcmpError::DestinationUnreachable { reply }
            | IcmpError::TimeExceeded { reply }
            | IcmpError::Other { reply } => reply,
        }
    }
}

/// Errors raised while decoding bytes received off the wire.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("packet shorter than the minimum ICMP header size")]
    InvalidPacket,

    #[error("unsupported or malformed IP header: {0}")]
    InvalidIpHeader(#[from] crate::ip::IpHeaderError),
}

/// Top-level error type returned by every public operation in this crate.
#[derive(Debug, Error)]
pub enum LibError {
    #[error("name lookup failed for {host:?}: {source}")]
    NameLookupError {
        host: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },

    #[error(transparent)]
    SocketError(#[from] SocketError),

    #[error(transparent)]
    IcmpError(#[from] IcmpError),

    #[error(transparent)]
    DecodeError(#[from] DecodeError),
}

pub type LibResult<T> = Result<T, LibError>;
