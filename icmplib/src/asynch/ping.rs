//! Async convenience entry points, mirroring [`crate::ping`] and
//! [`crate::multiping`] but built on the shared [`Listener`]/[`Pinger`]
//! instead of one OS thread per family.

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::Semaphore;
use tokio::time;

use crate::error::LibError;
use crate::multiping::MultipingOptions;
use crate::ping::PingOptions;
use crate::request::Family;
use crate::resolve;
use crate::stats::Host;

use super::listener::Listener;

/// Async equivalent of [`crate::ping::ping`]: pings `address` `options.count`
/// times over one shared, non-blocking socket instead of blocking the
/// calling thread between probes.
pub async fn async_ping(address: &str, options: &PingOptions) -> Result<Host, LibError> {
    let candidates = resolve::resolve(address, options.family)?;
    let destination = candidates[0];
    let family = Family::of(&destination);

    let listener = Listener::new(family, options.privileged, options.source)?;
    let mut pinger = listener.pinger();
    if let Some(identifier) = options.identifier {
        pinger = pinger.with_identifier(identifier);
    }

    let mut rtts = Vec::new();
    for seq in 0..options.count {
        if let Some(rtt) = pinger
            .ping(
                destination,
                seq as u16,
                options.ttl,
                options.payload_size,
                options.timeout,
            )
            .await?
        {
            rtts.push(rtt);
        }
        if seq + 1 < options.count {
            time::sleep(options.interval).await;
        }
    }

    Ok(Host::new(destination, options.count, rtts))
}

/// Async equivalent of [`crate::multiping::multiping`]: every destination is
/// driven by its own spawned task against a per-family shared [`Listener`],
/// bounded overall by `options.concurrent_tasks` via a semaphore rather than
/// by per-thread scheduling.
pub async fn async_multiping(addresses: &[&str], options: &MultipingOptions) -> Result<Vec<Host>, LibError> {
    let mut targets: Vec<(usize, IpAddr)> = Vec::with_capacity(addresses.len());
    for (index, address) in addresses.iter().enumerate() {
        let resolved = resolve::resolve(address, None)?;
        targets.push((index, resolved[0]));
    }

    let mut listeners: HashMap<Family, std::sync::Arc<Listener>> = HashMap::new();
    for (_, addr) in &targets {
        let family = Family::of(addr);
        if !listeners.contains_key(&family) {
            listeners.insert(family, std::sync::Arc::new(Listener::new(family, options.privileged, None)?));
        }
    }

    let semaphore = std::sync::Arc::new(Semaphore::new(options.concurrent_tasks.max(1)));
    let mut handles = Vec::with_capacity(targets.len());

    for (index, address) in targets {
        let listener = listeners.get(&Family::of(&address)).unwrap().clone();
        let semaphore = semaphore.clone();
        let options = options.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let pinger = listener.pinger();
            let mut rtts = Vec::new();
            for probe in 0..options.count {
                // `next_sequence` is shared by every destination on this
                // family's Listener, since they all share one identifier —
                // it's what keeps their correlation keys from colliding.
                let seq = listener.next_sequence();
                match pinger
                    .ping(address, seq, options.ttl, options.payload_size, options.timeout)
                    .await
                {
                    Ok(Some(rtt)) => rtts.push(rtt),
                    Ok(None) => {}
                    Err(_) => {}
                }
                if probe + 1 < options.count {
                    time::sleep(options.interval).await;
                }
            }
            (index, Host::new(address, options.count, rtts))
        }));
    }

    let mut results: Vec<Option<Host>> = vec![None; handles.len()];
    for handle in handles {
        let (index, host) = handle
            .await
            .map_err(|_| LibError::SocketError(crate::error::SocketError::UnavailableError))?;
        results[index] = Some(host);
    }

    Ok(results.into_iter().map(|h| h.expect("every target scheduled")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_reused_from_sync_engines() {
        let options = PingOptions::default();
        assert_eq!(options.count, 4);
        let multi = MultipingOptions::default();
        assert_eq!(multi.concurrent_tasks, 50);
    }
}
