use crate::topology::ip::parse_cidr;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A static route: traffic for `destination` is handed to `next`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route {
    pub destination: IpRange,
    pub next: Ipv4Addr,
}

impl Route {
    pub fn new(destination: IpRange, next: Ipv4Addr) -> Self {
        Self { destination, next }
    }

    pub fn next_hop_towards_destination(&self, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        if self.destination.contains(ip) {
            Some(self.next)
        } else {
            None
        }
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} via {}", self.destination, self.next)
    }
}

/// A subnet, normalized to its network address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpRange {
    network: Ipv4Addr,
    network_prefix: u8,
}

impl IpRange {
    /// Creates the range of `network_prefix` bits containing `ip` (host bits are cleared)
    pub fn new(ip: Ipv4Addr, network_prefix: u8) -> Self {
        let network_prefix = network_prefix.min(32);
        Self {
            network: Ipv4Addr::from_bits(ip.to_bits() & mask(network_prefix)),
            network_prefix,
        }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.network
    }

    pub fn end_inclusive(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.network.to_bits() | !mask(self.network_prefix))
    }

    pub fn network_prefix(&self) -> u8 {
        self.network_prefix
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        (self.start()..=self.end_inclusive()).contains(&ip)
    }
}

fn mask(network_prefix: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - network_prefix as u32)
        .unwrap_or(0)
}

impl Display for IpRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.network_prefix)
    }
}

impl FromStr for IpRange {
    type Err = anyhow::Error;

    // Parse ranges in CIDR syntax (e.g. 10.0.0.0/24)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base_ip, network_prefix) = parse_cidr(s)?;
        Ok(Self::new(base_ip, network_prefix))
    }
}

#[test]
fn test_ip_range() {
    let cases = [
        ("10.0.0.0/24", "10.0.0.0", "10.0.0.255"),
        ("10.0.0.123/24", "10.0.0.0", "10.0.0.255"),
        ("10.0.0.0/8", "10.0.0.0", "10.255.255.255"),
        ("20.0.0.0/12", "20.0.0.0", "20.15.255.255"),
        ("10.0.1.254/32", "10.0.1.254", "10.0.1.254"),
    ];

    for (input, range_start, range_end_inclusive) in cases {
        let range = IpRange::from_str(input).unwrap();
        assert_eq!(range.start().to_string(), range_start);
        assert_eq!(range.end_inclusive().to_string(), range_end_inclusive);
    }
}

#[test]
fn test_route_next_hop() {
    let route = Route::new(
        IpRange::from_str("10.0.2.0/24").unwrap(),
        Ipv4Addr::new(10, 0, 4, 2),
    );
    assert_eq!(route.to_string(), "10.0.2.0/24 via 10.0.4.2");
    assert_eq!(
        route.next_hop_towards_destination(Ipv4Addr::new(10, 0, 2, 1)),
        Some(Ipv4Addr::new(10, 0, 4, 2))
    );
    assert_eq!(
        route.next_hop_towards_destination(Ipv4Addr::new(10, 0, 3, 1)),
        None
    );
}
