use anyhow::{Context, bail};
use lab_network::topology::Topology;
use lab_network::topology::ip::Ipv4Cidr;
use lab_network::topology::spec::LinkEndpoint;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::fs::File;
use std::io::BufReader;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Deserialize, Clone)]
pub struct TopologyJson {
    nodes: Vec<NodeJson>,
    links: Vec<LinkJson>,
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct NodeJson {
    id: String,
    #[serde(rename = "type")]
    kind: NodeKindJson,
    /// The host's address, which ends up on the interface of its first link
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    address: Option<Ipv4Cidr>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    gateway: Option<Ipv4Addr>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
enum NodeKindJson {
    Router,
    Switch,
    Host,
}

#[derive(Deserialize, Clone)]
struct LinkJson {
    a: LinkEndpointJson,
    b: LinkEndpointJson,
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct LinkEndpointJson {
    node: String,
    #[serde(default)]
    interface: Option<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    address: Option<Ipv4Cidr>,
}

impl From<LinkEndpointJson> for LinkEndpoint {
    fn from(json: LinkEndpointJson) -> Self {
        LinkEndpoint {
            node: json.node,
            interface: json.interface,
            address: json.address,
        }
    }
}

impl TryFrom<TopologyJson> for Topology {
    type Error = anyhow::Error;

    fn try_from(json: TopologyJson) -> Result<Self, Self::Error> {
        let mut builder = Topology::builder();
        for node in json.nodes {
            match node.kind {
                NodeKindJson::Router | NodeKindJson::Switch
                    if node.address.is_some() || node.gateway.is_some() =>
                {
                    bail!(
                        "node `{}` is not a host, so it cannot have an address or gateway \
                         (router addresses belong to its links)",
                        node.id
                    );
                }
                NodeKindJson::Router => {
                    builder.add_router(node.id);
                }
                NodeKindJson::Switch => {
                    builder.add_switch(node.id);
                }
                NodeKindJson::Host => {
                    let Some(address) = node.address else {
                        bail!("host `{}` has no address", node.id);
                    };
                    let Some(gateway) = node.gateway else {
                        bail!("host `{}` has no default gateway", node.id);
                    };
                    builder.add_host(node.id, address, gateway);
                }
            }
        }

        for link in json.links {
            builder.add_link(link.a.into(), link.b.into());
        }

        Ok(builder.build()?)
    }
}

pub fn load_topology(path: &Path) -> anyhow::Result<Topology> {
    let file = File::open(path)
        .with_context(|| format!("failed to open topology file at {}", path.display()))?;
    let json: TopologyJson = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid JSON in topology file at {}", path.display()))?;
    Topology::try_from(json)
        .with_context(|| format!("invalid topology in {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use lab_network::routing::derive::derive_routes;
    use lab_network::routing::facts::RoutingFacts;
    use lab_network::ConfigurationError;

    fn parse(json: &str) -> anyhow::Result<Topology> {
        let json: TopologyJson = serde_json::from_str(json)?;
        Topology::try_from(json)
    }

    #[test]
    fn test_minimal_topology() {
        let topology = parse(
            r#"{
                "nodes": [
                    { "id": "R1", "type": "router" },
                    { "id": "S1", "type": "switch" },
                    {
                        "id": "H1",
                        "type": "host",
                        "address": "10.0.1.1/24",
                        "gateway": "10.0.1.254"
                    }
                ],
                "links": [
                    {
                        "a": { "node": "S1" },
                        "b": { "node": "R1", "interface": "R1-eth1", "address": "10.0.1.254/24" }
                    },
                    { "a": { "node": "H1" }, "b": { "node": "S1" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(topology.nodes().len(), 3);
        assert_eq!(topology.links().len(), 2);

        let host = topology.node("H1").unwrap();
        assert_eq!(host.interfaces[0].name, "H1-eth0");
        assert_eq!(host.interfaces[0].address.to_string(), "10.0.1.1/24");
        assert_eq!(host.gateway, Some(Ipv4Addr::new(10, 0, 1, 254)));
    }

    #[test]
    fn test_ring_topology_file() {
        let topology = parse(include_str!("../../topologies/ring4.json")).unwrap();
        assert_eq!(topology.routers().count(), 4);
        assert_eq!(topology.hosts().count(), 4);

        let facts = RoutingFacts::from_topology(&topology).unwrap();
        assert_eq!(facts.adjacencies.len(), 4);

        let plan = derive_routes(&facts).unwrap();
        let r1: Vec<_> = plan.routes("R1").iter().map(|r| r.to_string()).collect();
        assert_eq!(
            r1,
            [
                "10.0.2.0/24 via 10.0.12.2",
                "10.0.3.0/24 via 10.0.12.2",
                "10.0.4.0/24 via 10.0.41.1",
            ]
        );
    }

    #[test]
    fn test_invalid_topologies() {
        let missing_gateway = parse(
            r#"{
                "nodes": [{ "id": "H1", "type": "host", "address": "10.0.1.1/24" }],
                "links": []
            }"#,
        );
        assert_eq!(
            missing_gateway.unwrap_err().to_string(),
            "host `H1` has no default gateway"
        );

        let bad_address = parse(
            r#"{
                "nodes": [
                    { "id": "H1", "type": "host", "address": "10.0.1.1/33", "gateway": "10.0.1.1" }
                ],
                "links": []
            }"#,
        );
        assert!(bad_address.is_err());

        let unknown_node = parse(
            r#"{
                "nodes": [{ "id": "S1", "type": "switch" }],
                "links": [
                    { "a": { "node": "S1" }, "b": { "node": "R9", "address": "10.0.1.1/24" } }
                ]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(
            unknown_node.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnknownNode { node, .. }) if node == "R9"
        ));
    }
}
