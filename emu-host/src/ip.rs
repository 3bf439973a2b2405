//! Utilities and extension traits for dealing with IP addresses and prefixes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv4Network};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid CIDR address {0:?}: {1}")]
    Cidr(String, #[source] ipnetwork::IpNetworkError),
    #[error("host id {host_id} is outside of prefix {prefix}")]
    HostOutOfRange { prefix: Ipv4Network, host_id: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parses an address in CIDR notation (`10.0.0.1/24`, `2001:db8::1/64`).
///
/// A bare address is accepted and gets a host-length mask.
pub fn parse_cidr(s: &str) -> Result<IpNetwork> {
    s.trim().parse::<IpNetwork>().map_err(|e| Error::Cidr(s.to_owned(), e))
}

pub trait IpAddrExt {
    /// Whether this is an IPv6 link-local (`fe80::/10`) address.
    fn is_link_local_v6(&self) -> bool;
}

impl IpAddrExt for IpAddr {
    fn is_link_local_v6(&self) -> bool {
        match self {
            IpAddr::V4(_) => false,
            IpAddr::V6(v6) => is_link_local_v6(v6),
        }
    }
}

fn is_link_local_v6(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Address arithmetic on IPv4 prefixes used for control network assignment.
pub trait PrefixExt {
    /// The highest usable host address of the prefix (one below broadcast).
    fn max_addr(&self) -> Ipv4Addr;

    /// The address `network + host_id`, which must be a usable host address.
    fn host_addr(&self, host_id: u32) -> Result<Ipv4Addr>;
}

impl PrefixExt for Ipv4Network {
    fn max_addr(&self) -> Ipv4Addr {
        let broadcast = u32::from(self.broadcast());
        if self.prefix() >= 31 {
            return self.broadcast();
        }
        Ipv4Addr::from(broadcast - 1)
    }

    fn host_addr(&self, host_id: u32) -> Result<Ipv4Addr> {
        let network = u32::from(self.network());
        let broadcast = u32::from(self.broadcast());
        let addr = network.checked_add(host_id).filter(|a| *a < broadcast || self.prefix() >= 31);

        match addr {
            Some(addr) if host_id > 0 => Ok(Ipv4Addr::from(addr)),
            _ => Err(Error::HostOutOfRange { prefix: *self, host_id }),
        }
    }
}

/// Splits an address list into the IPv4 and IPv6 entries a link record carries.
///
/// At most one of each family is kept; a later entry replaces an earlier one. Entries that
/// fail to parse are skipped.
pub fn split_families<S: AsRef<str>>(addrs: &[S]) -> (Option<(Ipv4Addr, u8)>, Option<(Ipv6Addr, u8)>) {
    let mut v4 = None;
    let mut v6 = None;

    for addr in addrs {
        match parse_cidr(addr.as_ref()) {
            Ok(IpNetwork::V4(net)) => v4 = Some((net.ip(), net.prefix())),
            Ok(IpNetwork::V6(net)) => v6 = Some((net.ip(), net.prefix())),
            Err(e) => tracing::warn!(%e, "skipping malformed interface address"),
        }
    }

    (v4, v6)
}
