//! Address utilities and name resolution.
//!
//! Returns every resolved address of the requested family rather than just
//! the first, and accepts a family hint; with no hint, IPv4 results are
//! tried before IPv6.

use std::net::IpAddr;

use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::Resolver;
use tracing::debug;

use crate::error::LibError;
use crate::request::Family;

/// `true` if `host` parses as a literal IPv4 or IPv6 address.
pub fn is_ip_literal(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Resolves `host` to one or more addresses. If `host` is already a literal,
/// returns it unchanged. Otherwise performs a DNS lookup, preferring `family`
/// when given, else v4 then v6.
pub fn resolve(host: &str, family: Option<Family>) -> Result<Vec<IpAddr>, LibError> {
    if let Ok(literal) = host.parse::<IpAddr>() {
        return Ok(vec![literal]);
    }

    let resolver = Resolver::new(ResolverConfig::default(), ResolverOpts::default())
        .map_err(|source| LibError::NameLookupError {
            host: host.to_string(),
            source,
        })?;

    let lookup = resolver
        .lookup_ip(host)
        .map_err(|source| LibError::NameLookupError {
            host: host.to_string(),
            source,
        })?;

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for addr in lookup.iter() {
        match addr {
            IpAddr::V4(_) => v4.push(addr),
            IpAddr::V6(_) => v6.push(addr),
        }
    }

    debug!(host, v4 = v4.len(), v6 = v6.len(), "resolved host");

    let ordered = match family {
        Some(Family::V4) => v4,
        Some(Family::V6) => v6,
        None => {
            v4.extend(v6);
            v4
        }
    };

    if ordered.is_empty() {
        return Err(LibError::NameLookupError {
            host: host.to_string(),
            source: trust_dns_resolver::error::ResolveError::from(
                trust_dns_resolver::error::ResolveErrorKind::Message(
                    "no address of the requested family",
                ),
            ),
        });
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_v4_short_circuits_dns() {
        let addrs = resolve("127.0.0.1", None).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn literal_v6_short_circuits_dns() {
        let addrs = resolve("::1", None).unwrap();
        assert_eq!(addrs, vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn is_ip_literal_recognizes_both_families() {
        assert!(is_ip_literal("192.0.2.1"));
        assert!(is_ip_literal("::1"));
        assert!(!is_ip_literal("example.invalid"));
    }
}
