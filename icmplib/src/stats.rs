//! Lazy RTT aggregation. `Host`/`Hop` store only what was actually
//! observed — the RTT list and how many probes were sent — and compute
//! everything else on access, so appending RTTs incrementally (as the
//! scheduler in `multiping.rs` does) never leaves a stale cache behind.

use std::fmt;
use std::net::IpAddr;

/// Aggregated results of pinging a single host.
#[derive(Debug, Clone)]
pub struct Host {
    pub address: IpAddr,
    rtts: Vec<f64>,
    packets_sent: u32,
}

impl Host {
    pub fn new(address: IpAddr, packets_sent: u32, rtts: Vec<f64>) -> Self {
        Self {
            address,
            rtts,
            packets_sent,
        }
    }

    pub fn rtts(&self) -> &[f64] {
        &self.rtts
    }

    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }

    pub fn packets_received(&self) -> u32 {
        self.rtts.len() as u32
    }

    pub fn packet_loss(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            1.0 - (self.packets_received() as f64 / self.packets_sent as f64)
        }
    }

    pub fn min_rtt(&self) -> f64 {
        if self.rtts.is_empty() {
            0.0
        } else {
            self.rtts.iter().cloned().fold(f64::INFINITY, f64::min)
        }
    }

    pub fn avg_rtt(&self) -> f64 {
        if self.rtts.is_empty() {
            0.0
        } else {
            self.rtts.iter().sum::<f64>() / self.rtts.len() as f64
        }
    }

    pub fn max_rtt(&self) -> f64 {
        self.rtts.iter().cloned().fold(0.0_f64, f64::max)
    }

    /// Mean of absolute differences between consecutive RTTs; 0 with fewer
    /// than 2 samples.
    pub fn jitter(&self) -> f64 {
        if self.rtts.len() < 2 {
            return 0.0;
        }
        let diffs: f64 = self
            .rtts
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .sum();
        diffs / (self.rtts.len() - 1) as f64
    }

    pub fn is_alive(&self) -> bool {
        self.packets_received() > 0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent={} received={} loss={:.1}% min/avg/max/jitter={:.2}/{:.2}/{:.2}/{:.2} ms",
            self.address,
            self.packets_sent(),
            self.packets_received(),
            self.packet_loss() * 100.0,
            self.min_rtt(),
            self.avg_rtt(),
            self.max_rtt(),
            self.jitter(),
        )
    }
}

/// Same shape as `Host` plus the TTL distance that elicited the reply.
#[derive(Debug, Clone)]
pub struct Hop {
    pub distance: u8,
    inner: Host,
}

impl Hop {
    pub fn new(distance: u8, address: IpAddr, packets_sent: u32, rtts: Vec<f64>) -> Self {
        Self {
            distance,
            inner: Host::new(address, packets_sent, rtts),
        }
    }

    pub fn address(&self) -> IpAddr {
        self.inner.address
    }

    pub fn rtts(&self) -> &[f64] {
        self.inner.rtts()
    }

    pub fn packets_sent(&self) -> u32 {
        self.inner.packets_sent()
    }

    pub fn packets_received(&self) -> u32 {
        self.inner.packets_received()
    }

    pub fn packet_loss(&self) -> f64 {
        self.inner.packet_loss()
    }

    pub fn min_rtt(&self) -> f64 {
        self.inner.min_rtt()
    }

    pub fn avg_rtt(&self) -> f64 {
        self.inner.avg_rtt()
    }

    pub fn max_rtt(&self) -> f64 {
        self.inner.max_rtt()
    }

    pub fn jitter(&self) -> f64 {
        self.inner.jitter()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}  {}", self.distance, self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn empty_host_has_zeroed_stats() {
        let host = Host::new(addr(), 0, vec![]);
        assert_eq!(host.packet_loss(), 0.0);
        assert_eq!(host.min_rtt(), 0.0);
        assert_eq!(host.avg_rtt(), 0.0);
        assert_eq!(host.max_rtt(), 0.0);
        assert_eq!(host.jitter(), 0.0);
        assert!(!host.is_alive());
    }

    #[test]
    fn full_loss_when_nothing_received() {
        let host = Host::new(addr(), 4, vec![]);
        assert_eq!(host.packet_loss(), 1.0);
        assert!(!host.is_alive());
    }

    #[test]
    fn partial_loss_and_basic_stats() {
        let host = Host::new(addr(), 4, vec![10.0, 20.0, 30.0]);
        assert_eq!(host.packets_received(), 3);
        assert!((host.packet_loss() - 0.25).abs() < 1e-9);
        assert_eq!(host.min_rtt(), 10.0);
        assert_eq!(host.max_rtt(), 30.0);
        assert_eq!(host.avg_rtt(), 20.0);
        assert!(host.is_alive());
    }

    #[test]
    fn jitter_is_mean_of_consecutive_abs_diffs() {
        let host = Host::new(addr(), 3, vec![10.0, 12.0, 9.0]);
        // |12-10| = 2, |9-12| = 3 -> mean 2.5
        assert!((host.jitter() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn single_rtt_has_zero_jitter() {
        let host = Host::new(addr(), 1, vec![10.0]);
        assert_eq!(host.jitter(), 0.0);
    }
}
