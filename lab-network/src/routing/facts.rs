use crate::error::ConfigurationError;
use crate::routing::route::IpRange;
use crate::topology::Topology;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// A router's host-facing segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostSubnet {
    pub router: String,
    pub subnet: IpRange,
    /// The router's own address on the subnet, used by the hosts as their gateway
    pub gateway: Ipv4Addr,
}

/// Two routers sharing a transit subnet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterAdjacency {
    pub a: String,
    pub a_address: Ipv4Addr,
    pub b: String,
    pub b_address: Ipv4Addr,
    pub subnet: IpRange,
}

impl RouterAdjacency {
    /// Returns the other router of the adjacency and its address on the shared subnet
    pub fn peer_of(&self, router: &str) -> Option<(&str, Ipv4Addr)> {
        if self.a == router {
            Some((self.b.as_str(), self.b_address))
        } else if self.b == router {
            Some((self.a.as_str(), self.a_address))
        } else {
            None
        }
    }
}

/// Everything route derivation needs to know about a network
///
/// The table can be written by hand or extracted from a [`Topology`]; growing the network means
/// editing the table, never the derivation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingFacts {
    pub host_subnets: Vec<HostSubnet>,
    pub adjacencies: Vec<RouterAdjacency>,
}

impl RoutingFacts {
    /// Classifies the segments of a topology
    ///
    /// A segment with exactly one router and at least one host is that router's host-facing
    /// subnet. A segment with exactly two routers and no hosts is an inter-router adjacency. A
    /// segment with at most one router and no hosts plays no part in routing; any other shape is
    /// rejected.
    pub fn from_topology(topology: &Topology) -> Result<Self, ConfigurationError> {
        let mut facts = Self::default();
        for segment in topology.segments() {
            let routers: Vec<_> = segment.routers().collect();
            let hosts = segment.hosts().count();

            match (routers.as_slice(), hosts) {
                ([router], 1..) => facts.host_subnets.push(HostSubnet {
                    router: router.node.clone(),
                    subnet: router.interface.address.network(),
                    gateway: router.interface.address.address(),
                }),
                ([a, b], 0) => facts.adjacencies.push(RouterAdjacency {
                    a: a.node.clone(),
                    a_address: a.interface.address.address(),
                    b: b.node.clone(),
                    b_address: b.interface.address.address(),
                    subnet: a.interface.address.network(),
                }),
                ([] | [_], 0) => {}
                (routers, hosts) => {
                    return Err(ConfigurationError::UnsupportedSegment {
                        segment: segment.name(),
                        routers: routers.len(),
                        hosts,
                    });
                }
            }
        }

        facts.validate()?;
        Ok(facts)
    }

    /// Checks that no two routers share more than one transit subnet
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen: BTreeMap<(&str, &str), IpRange> = BTreeMap::new();
        for adjacency in &self.adjacencies {
            let key = if adjacency.a <= adjacency.b {
                (adjacency.a.as_str(), adjacency.b.as_str())
            } else {
                (adjacency.b.as_str(), adjacency.a.as_str())
            };

            if let Some(first) = seen.insert(key, adjacency.subnet) {
                return Err(ConfigurationError::DuplicateAdjacency {
                    a: key.0.to_string(),
                    b: key.1.to_string(),
                    first,
                    second: adjacency.subnet,
                });
            }
        }

        Ok(())
    }

    /// All routers mentioned by the table, in name order
    pub fn routers(&self) -> BTreeSet<&str> {
        self.host_subnets
            .iter()
            .map(|h| h.router.as_str())
            .chain(
                self.adjacencies
                    .iter()
                    .flat_map(|a| [a.a.as_str(), a.b.as_str()]),
            )
            .collect()
    }

    /// Routers directly adjacent to `router`, with the address to use as next hop towards each
    pub fn neighbors(&self, router: &str) -> BTreeMap<&str, Ipv4Addr> {
        self.adjacencies
            .iter()
            .filter_map(|a| a.peer_of(router))
            .collect()
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::ip::Ipv4Cidr;
    use crate::topology::spec::LinkEndpoint;
    use crate::topology::triangle::{triangle, triangle_builder};
    use std::str::FromStr;

    fn range(s: &str) -> IpRange {
        IpRange::from_str(s).unwrap()
    }

    fn cidr(s: &str) -> Ipv4Cidr {
        Ipv4Cidr::from_str(s).unwrap()
    }

    #[test]
    fn test_triangle_facts() {
        let facts = RoutingFacts::from_topology(&triangle().unwrap()).unwrap();

        let host_subnets: Vec<_> = facts
            .host_subnets
            .iter()
            .map(|h| (h.router.as_str(), h.subnet.to_string(), h.gateway.to_string()))
            .collect();
        assert_eq!(
            host_subnets,
            vec![
                ("R1", "10.0.1.0/24".to_string(), "10.0.1.254".to_string()),
                ("R2", "10.0.2.0/24".to_string(), "10.0.2.254".to_string()),
                ("R3", "10.0.3.0/24".to_string(), "10.0.3.254".to_string()),
            ]
        );

        assert_eq!(facts.adjacencies.len(), 3);
        assert_eq!(
            facts.routers().into_iter().collect::<Vec<_>>(),
            vec!["R1", "R2", "R3"]
        );
    }

    #[test]
    fn test_every_router_pair_shares_one_subnet() {
        let facts = RoutingFacts::from_topology(&triangle().unwrap()).unwrap();
        let routers: Vec<_> = facts.routers().into_iter().collect();

        for (i, r) in routers.iter().enumerate() {
            for s in &routers[i + 1..] {
                let shared: Vec<_> = facts
                    .adjacencies
                    .iter()
                    .filter(|a| a.peer_of(r).is_some_and(|(peer, _)| peer == *s))
                    .collect();
                assert_eq!(shared.len(), 1, "{r} <-> {s}");

                let adjacency = shared[0];
                assert_ne!(adjacency.a_address, adjacency.b_address);
                assert!(adjacency.subnet.contains(adjacency.a_address));
                assert!(adjacency.subnet.contains(adjacency.b_address));
            }
        }
    }

    #[test]
    fn test_duplicate_adjacency_is_rejected() {
        let adjacency = |subnet: &str, a: [u8; 4], b: [u8; 4]| RouterAdjacency {
            a: "R1".to_string(),
            a_address: Ipv4Addr::from(a),
            b: "R2".to_string(),
            b_address: Ipv4Addr::from(b),
            subnet: range(subnet),
        };
        let mut reversed = adjacency("10.0.7.0/24", [10, 0, 7, 2], [10, 0, 7, 1]);
        std::mem::swap(&mut reversed.a, &mut reversed.b);

        let facts = RoutingFacts {
            host_subnets: Vec::new(),
            adjacencies: vec![adjacency("10.0.4.0/24", [10, 0, 4, 1], [10, 0, 4, 2]), reversed],
        };

        assert_eq!(
            facts.validate().unwrap_err(),
            ConfigurationError::DuplicateAdjacency {
                a: "R1".to_string(),
                b: "R2".to_string(),
                first: range("10.0.4.0/24"),
                second: range("10.0.7.0/24"),
            }
        );
    }

    #[test]
    fn test_segments_of_unsupported_shape_are_rejected() {
        // R1 and R2 both sit on the host segment of H1
        let mut shared_host_segment = triangle_builder();
        shared_host_segment.add_link(
            LinkEndpoint::node("S1"),
            LinkEndpoint::interface("R2", "R2-eth4", cidr("10.0.1.253/24")),
        );
        let topology = shared_host_segment.build().unwrap();
        assert_eq!(
            RoutingFacts::from_topology(&topology).unwrap_err(),
            ConfigurationError::UnsupportedSegment {
                segment: "S1".to_string(),
                routers: 2,
                hosts: 2,
            }
        );

        // A third router on the R1-R2 transit segment
        let mut crowded_transit = triangle_builder();
        crowded_transit.add_router("R4").add_link(
            LinkEndpoint::node("S4"),
            LinkEndpoint::interface("R4", "R4-eth1", cidr("10.0.4.3/24")),
        );
        let topology = crowded_transit.build().unwrap();
        assert!(matches!(
            RoutingFacts::from_topology(&topology).unwrap_err(),
            ConfigurationError::UnsupportedSegment { segment, routers: 3, hosts: 0 }
                if segment == "S4"
        ));
    }

    #[test]
    fn test_stub_segments_play_no_part_in_routing() {
        let mut stub = triangle_builder();
        stub.add_switch("S7").add_link(
            LinkEndpoint::node("S7"),
            LinkEndpoint::interface("R3", "R3-eth4", cidr("10.0.7.1/24")),
        );
        let facts = RoutingFacts::from_topology(&stub.build().unwrap()).unwrap();

        assert_eq!(facts.host_subnets.len(), 3);
        assert_eq!(facts.adjacencies.len(), 3);
    }
}
