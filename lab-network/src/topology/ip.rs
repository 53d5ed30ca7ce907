use crate::routing::route::IpRange;
use anyhow::{Context, anyhow, bail};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An interface address together with the prefix length of the subnet it belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    pub(crate) address: Ipv4Addr,
    pub(crate) network_prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, network_prefix: u8) -> anyhow::Result<Self> {
        check_network_prefix(network_prefix)?;
        Ok(Self {
            address,
            network_prefix,
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn network_prefix(&self) -> u8 {
        self.network_prefix
    }

    /// The subnet this address lives on (e.g. `10.0.4.0/24` for `10.0.4.1/24`)
    pub fn network(&self) -> IpRange {
        IpRange::new(self.address, self.network_prefix)
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.network_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, network_prefix) = parse_cidr(s)?;
        Ok(Self {
            address,
            network_prefix,
        })
    }
}

/// Parses `a.b.c.d/len` into its parts
///
/// A missing network prefix is interpreted as /32 (i.e. a single address)
pub(crate) fn parse_cidr(s: &str) -> anyhow::Result<(Ipv4Addr, u8)> {
    let mut parts = s.split('/');
    let base_ip: IpAddr = parts
        .next()
        .ok_or(anyhow!("empty string"))?
        .parse()
        .context("invalid ip address in cidr")?;

    let IpAddr::V4(base_ip) = base_ip else {
        bail!("only IPv4 supported at the moment");
    };

    let network_prefix: u8 = parts
        .next()
        .unwrap_or("32")
        .parse()
        .context("the provided network prefix is not a valid unsigned integer")?;
    check_network_prefix(network_prefix)?;

    if parts.next().is_some() {
        bail!("cidr contains trailing characters");
    }

    Ok((base_ip, network_prefix))
}

fn check_network_prefix(network_prefix: u8) -> anyhow::Result<()> {
    if network_prefix == 0 {
        bail!("network prefix cannot be 0");
    }
    if network_prefix > 32 {
        bail!("network prefix cannot be higher than 32");
    }

    Ok(())
}

#[test]
fn test_ipv4_cidr() {
    let cidr = Ipv4Cidr::from_str("10.0.4.1/24").unwrap();
    assert_eq!(cidr.address(), Ipv4Addr::new(10, 0, 4, 1));
    assert_eq!(cidr.network_prefix(), 24);
    assert_eq!(cidr.to_string(), "10.0.4.1/24");
    assert_eq!(cidr.network().to_string(), "10.0.4.0/24");

    let single = Ipv4Cidr::from_str("10.0.1.254").unwrap();
    assert_eq!(single.network_prefix(), 32);

    for invalid in ["", "10.0.0.1/0", "10.0.0.1/33", "10.0.0.1/24/1", "::1/64", "10.0.0/24"] {
        assert!(Ipv4Cidr::from_str(invalid).is_err(), "{invalid}");
    }
}
