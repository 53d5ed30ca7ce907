use crate::topology::ip::Ipv4Cidr;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Router,
    Switch,
    Host,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Router => "router",
            NodeKind::Switch => "switch",
            NodeKind::Host => "host",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: Ipv4Cidr,
}

#[derive(Clone, Debug)]
pub struct NetworkNodeSpec {
    pub id: String,
    pub kind: NodeKind,
    pub interfaces: Vec<NetworkInterface>,
    /// The host's default gateway (always `None` for routers and switches)
    pub gateway: Option<Ipv4Addr>,
}

impl NetworkNodeSpec {
    pub fn interface(&self, name: &str) -> Option<&NetworkInterface> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

/// One side of a link
///
/// Routers and hosts attach through a named interface carrying an address; switches are plain
/// layer-2 segments and take neither.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEndpoint {
    pub node: String,
    pub interface: Option<String>,
    pub address: Option<Ipv4Cidr>,
}

impl LinkEndpoint {
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: None,
            address: None,
        }
    }

    pub fn interface(
        node: impl Into<String>,
        interface: impl Into<String>,
        address: Ipv4Cidr,
    ) -> Self {
        Self {
            node: node.into(),
            interface: Some(interface.into()),
            address: Some(address),
        }
    }
}

impl Display for LinkEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.interface {
            Some(interface) => write!(f, "{}:{interface}", self.node),
            None => write!(f, "{}", self.node),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkLinkSpec {
    pub a: LinkEndpoint,
    pub b: LinkEndpoint,
}

impl NetworkLinkSpec {
    pub fn new(a: LinkEndpoint, b: LinkEndpoint) -> Self {
        Self { a, b }
    }

    pub fn endpoints(&self) -> [&LinkEndpoint; 2] {
        [&self.a, &self.b]
    }
}

impl Display for NetworkLinkSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -- {}", self.a, self.b)
    }
}
