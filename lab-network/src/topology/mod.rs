pub mod ip;
pub mod spec;
pub mod triangle;

use crate::error::ConfigurationError;
use crate::topology::ip::Ipv4Cidr;
use crate::topology::spec::{
    LinkEndpoint, NetworkInterface, NetworkLinkSpec, NetworkNodeSpec, NodeKind,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;

/// A validated network, assembled through a [`TopologyBuilder`] and immutable afterwards
#[derive(Clone, Debug)]
pub struct Topology {
    nodes: Vec<NetworkNodeSpec>,
    links: Vec<NetworkLinkSpec>,
    segments: Vec<Segment>,
}

/// A layer-2 broadcast domain: one or more connected switches, or a direct node-to-node link
#[derive(Clone, Debug)]
pub struct Segment {
    pub switches: Vec<String>,
    pub members: Vec<Attachment>,
}

/// A router or host interface plugged into a segment
#[derive(Clone, Debug)]
pub struct Attachment {
    pub node: String,
    pub kind: NodeKind,
    pub interface: NetworkInterface,
}

impl Segment {
    /// The switches forming the segment, or the two nodes of a direct link
    pub fn name(&self) -> String {
        if self.switches.is_empty() {
            let nodes: Vec<_> = self.members.iter().map(|m| m.node.as_str()).collect();
            nodes.join(" -- ")
        } else {
            self.switches.join("+")
        }
    }

    pub fn routers(&self) -> impl Iterator<Item = &Attachment> {
        self.members.iter().filter(|m| m.kind == NodeKind::Router)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Attachment> {
        self.members.iter().filter(|m| m.kind == NodeKind::Host)
    }

    pub fn has_member(&self, node: &str) -> bool {
        self.members.iter().any(|m| m.node == node)
    }

    /// Returns the member whose interface carries `address`
    pub fn owner_of(&self, address: Ipv4Addr) -> Option<&Attachment> {
        self.members
            .iter()
            .find(|m| m.interface.address.address() == address)
    }
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    pub fn nodes(&self) -> &[NetworkNodeSpec] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NetworkNodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Links with every router and host endpoint resolved to a named, addressed interface
    pub fn links(&self) -> &[NetworkLinkSpec] {
        &self.links
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NetworkNodeSpec> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn routers(&self) -> impl Iterator<Item = &NetworkNodeSpec> {
        self.nodes_of_kind(NodeKind::Router)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &NetworkNodeSpec> {
        self.nodes_of_kind(NodeKind::Host)
    }

    /// Router addresses a host can use as default route next hops, its own gateway first
    ///
    /// Only routers sharing a segment with the host qualify, since any other address is not
    /// on-link for it.
    pub fn gateways_of(&self, host: &str) -> Vec<Ipv4Addr> {
        let Some(node) = self.node(host).filter(|n| n.kind == NodeKind::Host) else {
            return Vec::new();
        };

        let mut gateways: Vec<Ipv4Addr> = node.gateway.into_iter().collect();
        for segment in self.segments.iter().filter(|s| s.has_member(host)) {
            for router in segment.routers() {
                let address = router.interface.address.address();
                if !gateways.contains(&address) {
                    gateways.push(address);
                }
            }
        }

        gateways
    }
}

#[derive(Clone, Debug, Default)]
pub struct TopologyBuilder {
    nodes: Vec<NetworkNodeSpec>,
    links: Vec<NetworkLinkSpec>,
}

impl TopologyBuilder {
    pub fn add_router(&mut self, id: impl Into<String>) -> &mut Self {
        self.add_node(id.into(), NodeKind::Router, Vec::new(), None)
    }

    pub fn add_switch(&mut self, id: impl Into<String>) -> &mut Self {
        self.add_node(id.into(), NodeKind::Switch, Vec::new(), None)
    }

    /// Adds a host with a single interface (`<id>-eth0`) and a default gateway
    pub fn add_host(
        &mut self,
        id: impl Into<String>,
        address: Ipv4Cidr,
        gateway: Ipv4Addr,
    ) -> &mut Self {
        let id = id.into();
        let interface = NetworkInterface {
            name: format!("{id}-eth0"),
            address,
        };
        self.add_node(id, NodeKind::Host, vec![interface], Some(gateway))
    }

    fn add_node(
        &mut self,
        id: String,
        kind: NodeKind,
        interfaces: Vec<NetworkInterface>,
        gateway: Option<Ipv4Addr>,
    ) -> &mut Self {
        self.nodes.push(NetworkNodeSpec {
            id,
            kind,
            interfaces,
            gateway,
        });
        self
    }

    pub fn add_link(&mut self, a: LinkEndpoint, b: LinkEndpoint) -> &mut Self {
        self.links.push(NetworkLinkSpec::new(a, b));
        self
    }

    pub fn build(&self) -> Result<Topology, ConfigurationError> {
        let mut nodes: Vec<NetworkNodeSpec> = Vec::with_capacity(self.nodes.len());
        let mut index = HashMap::new();
        for node in &self.nodes {
            if index.insert(node.id.clone(), nodes.len()).is_some() {
                return Err(ConfigurationError::DuplicateNode {
                    node: node.id.clone(),
                });
            }
            nodes.push(node.clone());
        }

        // Hosts may reuse their primary interface for a single link
        let mut primary_taken = HashSet::new();
        let mut links = Vec::with_capacity(self.links.len());
        let mut attachments = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let name = link.to_string();
            if link.a.node == link.b.node {
                return Err(ConfigurationError::SelfLink {
                    link: name,
                    node: link.a.node.clone(),
                });
            }

            let mut resolved = link.clone();
            let mut sides = [None, None];
            for (side, endpoint) in [&mut resolved.a, &mut resolved.b].into_iter().enumerate() {
                let Some(&i) = index.get(&endpoint.node) else {
                    return Err(ConfigurationError::UnknownNode {
                        link: name,
                        node: endpoint.node.clone(),
                    });
                };

                let node = &mut nodes[i];
                sides[side] = resolve_endpoint(&name, node, endpoint, &mut primary_taken)?;
            }

            links.push(resolved);
            attachments.push(sides);
        }

        check_unique_addresses(&nodes)?;
        check_gateways(&nodes)?;

        let segments = collect_segments(&nodes, &links, attachments);
        check_segment_subnets(&segments)?;
        check_gateway_owners(&nodes, &segments)?;

        Ok(Topology {
            nodes,
            links,
            segments,
        })
    }
}

/// Gives a router or host endpoint its interface, registering it on the node
///
/// Returns `None` for switch endpoints.
fn resolve_endpoint(
    link: &str,
    node: &mut NetworkNodeSpec,
    endpoint: &mut LinkEndpoint,
    primary_taken: &mut HashSet<String>,
) -> Result<Option<Attachment>, ConfigurationError> {
    if node.kind == NodeKind::Switch {
        if endpoint.interface.is_some() || endpoint.address.is_some() {
            return Err(ConfigurationError::AddressOnSwitch {
                link: link.to_string(),
                switch: node.id.clone(),
            });
        }
        return Ok(None);
    }

    let interface = match endpoint.address {
        Some(address) => {
            let name = endpoint.interface.clone().unwrap_or_else(|| {
                // Routers number their interfaces from 1, hosts already own eth0
                let offset = usize::from(node.kind == NodeKind::Router);
                format!("{}-eth{}", node.id, node.interfaces.len() + offset)
            });
            if node.interface(&name).is_some() {
                return Err(ConfigurationError::DuplicateInterface {
                    node: node.id.clone(),
                    interface: name,
                });
            }

            let interface = NetworkInterface { name, address };
            node.interfaces.push(interface.clone());
            interface
        }
        None => {
            let primary = node
                .interfaces
                .first()
                .filter(|_| node.kind == NodeKind::Host)
                .filter(|p| endpoint.interface.as_deref().is_none_or(|i| i == p.name))
                .filter(|_| !primary_taken.contains(&node.id))
                .cloned();
            let Some(primary) = primary else {
                return Err(ConfigurationError::MissingAddress {
                    link: link.to_string(),
                    node: node.id.clone(),
                });
            };

            primary_taken.insert(node.id.clone());
            primary
        }
    };

    endpoint.interface = Some(interface.name.clone());
    endpoint.address = Some(interface.address);
    Ok(Some(Attachment {
        node: node.id.clone(),
        kind: node.kind,
        interface,
    }))
}

fn check_unique_addresses(nodes: &[NetworkNodeSpec]) -> Result<(), ConfigurationError> {
    let mut owners: HashMap<Ipv4Addr, &str> = HashMap::new();
    for node in nodes {
        for interface in &node.interfaces {
            let address = interface.address.address();
            if let Some(first) = owners.insert(address, &node.id) {
                return Err(ConfigurationError::DuplicateAddress {
                    address,
                    first: first.to_string(),
                    second: node.id.clone(),
                });
            }
        }
    }

    Ok(())
}

fn check_gateways(nodes: &[NetworkNodeSpec]) -> Result<(), ConfigurationError> {
    for node in nodes {
        let Some(gateway) = node.gateway else {
            continue;
        };

        let on_link = node
            .interfaces
            .iter()
            .any(|i| i.address.network().contains(gateway));
        if !on_link {
            return Err(ConfigurationError::GatewayOutsideSubnet {
                host: node.id.clone(),
                gateway,
            });
        }
    }

    Ok(())
}

/// Every router and host attached to a segment must live on the same subnet
fn check_segment_subnets(segments: &[Segment]) -> Result<(), ConfigurationError> {
    for segment in segments {
        let mut networks = segment.members.iter().map(|m| m.interface.address.network());
        let Some(first) = networks.next() else {
            continue;
        };

        if let Some(second) = networks.find(|n| *n != first) {
            return Err(ConfigurationError::MixedSubnets {
                segment: segment.name(),
                first,
                second,
            });
        }
    }

    Ok(())
}

fn check_gateway_owners(
    nodes: &[NetworkNodeSpec],
    segments: &[Segment],
) -> Result<(), ConfigurationError> {
    for node in nodes {
        let Some(gateway) = node.gateway else {
            continue;
        };

        let owned_by_router = segments
            .iter()
            .filter(|s| s.has_member(&node.id))
            .filter_map(|s| s.owner_of(gateway))
            .any(|owner| owner.kind == NodeKind::Router);
        if !owned_by_router {
            return Err(ConfigurationError::GatewayNotARouter {
                host: node.id.clone(),
                gateway,
            });
        }
    }

    Ok(())
}

fn collect_segments(
    nodes: &[NetworkNodeSpec],
    links: &[NetworkLinkSpec],
    attachments: Vec<[Option<Attachment>; 2]>,
) -> Vec<Segment> {
    let switches: Vec<&str> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Switch)
        .map(|n| n.id.as_str())
        .collect();

    // Every switch starts out as its own segment, switch-to-switch links merge them
    let mut labels: HashMap<&str, usize> = switches
        .iter()
        .enumerate()
        .map(|(i, s)| (*s, i))
        .collect();
    for link in links {
        let a = labels.get(link.a.node.as_str());
        let b = labels.get(link.b.node.as_str());
        if let (Some(&a), Some(&b)) = (a, b) {
            if a != b {
                labels.values_mut().filter(|l| **l == b).for_each(|l| *l = a);
            }
        }
    }

    let mut segments: BTreeMap<usize, Segment> = BTreeMap::new();
    for switch in &switches {
        segments
            .entry(labels[switch])
            .or_insert_with(|| Segment {
                switches: Vec::new(),
                members: Vec::new(),
            })
            .switches
            .push(switch.to_string());
    }

    let mut next_label = switches.len();
    for (link, sides) in links.iter().zip(attachments) {
        match sides {
            [Some(a), Some(b)] => {
                segments.insert(
                    next_label,
                    Segment {
                        switches: Vec::new(),
                        members: vec![a, b],
                    },
                );
                next_label += 1;
            }
            [Some(member), None] => {
                if let Some(segment) = segments.get_mut(&labels[link.b.node.as_str()]) {
                    segment.members.push(member);
                }
            }
            [None, Some(member)] => {
                if let Some(segment) = segments.get_mut(&labels[link.a.node.as_str()]) {
                    segment.members.push(member);
                }
            }
            [None, None] => {}
        }
    }

    segments.into_values().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn cidr(s: &str) -> Ipv4Cidr {
        Ipv4Cidr::from_str(s).unwrap()
    }

    fn small_builder() -> TopologyBuilder {
        let mut builder = Topology::builder();
        builder
            .add_router("R1")
            .add_switch("S1")
            .add_host("H1", cidr("10.0.1.1/24"), Ipv4Addr::new(10, 0, 1, 254))
            .add_link(
                LinkEndpoint::node("S1"),
                LinkEndpoint::interface("R1", "R1-eth1", cidr("10.0.1.254/24")),
            )
            .add_link(LinkEndpoint::node("H1"), LinkEndpoint::node("S1"));
        builder
    }

    #[test]
    fn test_build_resolves_host_interfaces() {
        let topology = small_builder().build().unwrap();

        let host_link = &topology.links()[1];
        assert_eq!(host_link.a.interface.as_deref(), Some("H1-eth0"));
        assert_eq!(host_link.a.address, Some(cidr("10.0.1.1/24")));
        assert_eq!(host_link.b, LinkEndpoint::node("S1"));

        let segments = topology.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].switches, vec!["S1".to_string()]);
        assert_eq!(segments[0].routers().count(), 1);
        assert_eq!(segments[0].hosts().count(), 1);
    }

    #[test]
    fn test_router_interfaces_get_default_names() {
        let mut builder = small_builder();
        builder.add_switch("S2").add_link(
            LinkEndpoint {
                node: "R1".to_string(),
                interface: None,
                address: Some(cidr("10.0.4.1/24")),
            },
            LinkEndpoint::node("S2"),
        );

        let topology = builder.build().unwrap();
        let router = topology.node("R1").unwrap();
        assert_eq!(router.interfaces[1].name, "R1-eth2");
    }

    #[test]
    fn test_switch_segments_are_merged() {
        let mut builder = small_builder();
        builder
            .add_switch("S2")
            .add_host("H2", cidr("10.0.1.2/24"), Ipv4Addr::new(10, 0, 1, 254))
            .add_link(LinkEndpoint::node("S1"), LinkEndpoint::node("S2"))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S2"));

        let topology = builder.build().unwrap();
        let segments = topology.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].hosts().count(), 2);
        assert!(segments[0].has_member("H2"));
        assert_eq!(
            segments[0].owner_of(Ipv4Addr::new(10, 0, 1, 254)).unwrap().node,
            "R1"
        );
    }

    #[test]
    fn test_invalid_topologies_are_rejected() {
        let mut duplicate_node = small_builder();
        duplicate_node.add_router("R1");
        assert_eq!(
            duplicate_node.build().unwrap_err(),
            ConfigurationError::DuplicateNode {
                node: "R1".to_string()
            }
        );

        let mut unknown_node = small_builder();
        unknown_node.add_link(LinkEndpoint::node("H9"), LinkEndpoint::node("S1"));
        assert!(matches!(
            unknown_node.build().unwrap_err(),
            ConfigurationError::UnknownNode { node, .. } if node == "H9"
        ));

        let mut self_link = small_builder();
        self_link.add_link(LinkEndpoint::node("S1"), LinkEndpoint::node("S1"));
        assert!(matches!(
            self_link.build().unwrap_err(),
            ConfigurationError::SelfLink { .. }
        ));

        let mut switch_address = small_builder();
        switch_address.add_router("R2").add_link(
            LinkEndpoint::interface("S1", "S1-eth0", cidr("10.0.1.100/24")),
            LinkEndpoint::interface("R2", "R2-eth1", cidr("10.0.1.253/24")),
        );
        assert!(matches!(
            switch_address.build().unwrap_err(),
            ConfigurationError::AddressOnSwitch { switch, .. } if switch == "S1"
        ));

        let mut missing_address = small_builder();
        missing_address
            .add_switch("S2")
            .add_link(LinkEndpoint::node("R1"), LinkEndpoint::node("S2"));
        assert!(matches!(
            missing_address.build().unwrap_err(),
            ConfigurationError::MissingAddress { node, .. } if node == "R1"
        ));

        let mut reused_host_interface = small_builder();
        reused_host_interface
            .add_switch("S2")
            .add_link(LinkEndpoint::node("H1"), LinkEndpoint::node("S2"));
        assert!(matches!(
            reused_host_interface.build().unwrap_err(),
            ConfigurationError::MissingAddress { node, .. } if node == "H1"
        ));

        let mut duplicate_interface = small_builder();
        duplicate_interface.add_switch("S2").add_link(
            LinkEndpoint::interface("R1", "R1-eth1", cidr("10.0.4.1/24")),
            LinkEndpoint::node("S2"),
        );
        assert!(matches!(
            duplicate_interface.build().unwrap_err(),
            ConfigurationError::DuplicateInterface { interface, .. } if interface == "R1-eth1"
        ));

        let mut duplicate_address = small_builder();
        duplicate_address
            .add_host("H2", cidr("10.0.1.1/24"), Ipv4Addr::new(10, 0, 1, 254))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S1"));
        assert_eq!(
            duplicate_address.build().unwrap_err(),
            ConfigurationError::DuplicateAddress {
                address: Ipv4Addr::new(10, 0, 1, 1),
                first: "H1".to_string(),
                second: "H2".to_string(),
            }
        );

        let mut bad_gateway = small_builder();
        bad_gateway
            .add_host("H2", cidr("10.0.1.2/24"), Ipv4Addr::new(10, 0, 2, 254))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S1"));
        assert!(matches!(
            bad_gateway.build().unwrap_err(),
            ConfigurationError::GatewayOutsideSubnet { host, .. } if host == "H2"
        ));
    }

    #[test]
    fn test_segment_members_share_a_subnet() {
        // The host's address and gateway agree with each other, but not with R1
        let mut foreign_host = small_builder();
        foreign_host
            .add_host("H2", cidr("10.0.9.1/24"), Ipv4Addr::new(10, 0, 9, 254))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S1"));
        assert_eq!(
            foreign_host.build().unwrap_err(),
            ConfigurationError::MixedSubnets {
                segment: "S1".to_string(),
                first: cidr("10.0.1.0/24").network(),
                second: cidr("10.0.9.0/24").network(),
            }
        );

        let mut mismatched_routers = small_builder();
        mismatched_routers
            .add_router("R2")
            .add_switch("S4")
            .add_link(
                LinkEndpoint::node("S4"),
                LinkEndpoint::interface("R1", "R1-eth2", cidr("10.0.4.1/24")),
            )
            .add_link(
                LinkEndpoint::node("S4"),
                LinkEndpoint::interface("R2", "R2-eth2", cidr("10.0.7.2/24")),
            );
        assert!(matches!(
            mismatched_routers.build().unwrap_err(),
            ConfigurationError::MixedSubnets { segment, .. } if segment == "S4"
        ));
    }

    #[test]
    fn test_gateway_must_be_a_router_on_the_segment() {
        // 10.0.1.1 belongs to H1, not to a router
        let mut host_gateway = small_builder();
        host_gateway
            .add_host("H2", cidr("10.0.1.2/24"), Ipv4Addr::new(10, 0, 1, 1))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S1"));
        assert_eq!(
            host_gateway.build().unwrap_err(),
            ConfigurationError::GatewayNotARouter {
                host: "H2".to_string(),
                gateway: Ipv4Addr::new(10, 0, 1, 1),
            }
        );

        let mut unowned_gateway = small_builder();
        unowned_gateway
            .add_host("H2", cidr("10.0.1.2/24"), Ipv4Addr::new(10, 0, 1, 253))
            .add_link(LinkEndpoint::node("H2"), LinkEndpoint::node("S1"));
        assert!(matches!(
            unowned_gateway.build().unwrap_err(),
            ConfigurationError::GatewayNotARouter { host, .. } if host == "H2"
        ));
    }

    #[test]
    fn test_gateways_of_host() {
        let topology = small_builder().build().unwrap();
        assert_eq!(topology.gateways_of("H1"), [Ipv4Addr::new(10, 0, 1, 254)]);
        assert!(topology.gateways_of("R1").is_empty());
        assert!(topology.gateways_of("H9").is_empty());
    }
}
