use crate::backend::{EMULATION, EmulationBackend};
use crate::change::ConfigChange;
use crate::error::{CommandExecutionError, CommandFailure};
use crate::routing::route::{IpRange, Route};
use crate::topology::spec::{NetworkInterface, NodeKind};
use crate::topology::{Segment, Topology};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Default)]
pub struct InMemoryBackend {
    nodes: BTreeMap<String, NodeState>,
    segments: Vec<Segment>,
    running: bool,
}

#[derive(Clone, Debug)]
pub struct NodeState {
    pub kind: NodeKind,
    pub interfaces: Vec<NetworkInterface>,
    pub forwarding: bool,
    pub routes: BTreeMap<IpRange, Ipv4Addr>,
    /// Empty when the node has no default route
    pub default_nexthops: Vec<Ipv4Addr>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceError {
    #[error("node `{node}` does not exist")]
    UnknownNode { node: String },
    #[error("node `{node}` has no route towards {destination}")]
    NoRoute { node: String, destination: Ipv4Addr },
    #[error("next hop {next_hop} is not reachable from `{node}`")]
    NextHopUnreachable { node: String, next_hop: Ipv4Addr },
    #[error("node `{node}` received a packet for {destination}, but does not forward packets")]
    NotForwarding { node: String, destination: Ipv4Addr },
    #[error("packet towards {destination} loops: {}", .path.join(" -> "))]
    Loop {
        destination: Ipv4Addr,
        path: Vec<String>,
    },
}

impl NodeState {
    fn is_on_link(&self, address: Ipv4Addr) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.address.network().contains(address))
    }

    fn owns(&self, address: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.address.address() == address)
    }

    /// Candidate next hops towards `destination`, in order of preference
    ///
    /// On-link destinations are their own next hop. Otherwise the longest matching route wins,
    /// with the default route as the last resort.
    fn next_hops(&self, destination: Ipv4Addr) -> Vec<Ipv4Addr> {
        if self.is_on_link(destination) {
            return vec![destination];
        }

        let best_route = self
            .static_routes()
            .into_iter()
            .filter_map(|r| {
                r.next_hop_towards_destination(destination)
                    .map(|next| (r.destination.network_prefix(), next))
            })
            .max_by_key(|(prefix, _)| *prefix);
        if let Some((_, next)) = best_route {
            return vec![next];
        }

        self.default_nexthops.clone()
    }

    pub fn static_routes(&self) -> Vec<Route> {
        self.routes
            .iter()
            .map(|(destination, next)| Route::new(*destination, *next))
            .collect()
    }

    /// Renders the table the way `ip route` prints it
    pub fn route_table(&self) -> String {
        let mut output = String::new();
        match self.default_nexthops.as_slice() {
            [] => {}
            [gateway] => {
                _ = writeln!(output, "default via {gateway}");
            }
            nexthops => {
                output.push_str("default");
                for nexthop in nexthops {
                    _ = write!(output, " nexthop via {nexthop}");
                }
                output.push('\n');
            }
        }

        let mut entries: Vec<(IpRange, String)> = self
            .interfaces
            .iter()
            .map(|i| {
                let network = i.address.network();
                let line = format!(
                    "{network} dev {} proto kernel scope link src {}",
                    i.name,
                    i.address.address()
                );
                (network, line)
            })
            .collect();
        entries.extend(
            self.static_routes()
                .into_iter()
                .map(|r| (r.destination, r.to_string())),
        );
        entries.sort_by_key(|(destination, _)| *destination);

        for (_, line) in entries {
            _ = writeln!(output, "{line}");
        }

        output
    }

    fn addresses(&self) -> String {
        let mut output = String::new();
        for interface in &self.interfaces {
            _ = writeln!(output, "{}: {}", interface.name, interface.address);
        }

        output
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn node(&self, node: &str) -> Option<&NodeState> {
        self.nodes.get(node)
    }

    pub fn forwarding_enabled(&self, node: &str) -> Option<bool> {
        self.node(node).map(|n| n.forwarding)
    }

    pub fn routes(&self, node: &str) -> Vec<Route> {
        self.node(node)
            .map(NodeState::static_routes)
            .unwrap_or_default()
    }

    /// Follows gateways and routing tables from `from` until the node owning `destination`
    ///
    /// Returns the routers and hosts visited, including both ends. Switches are transparent.
    pub fn trace(&self, from: &str, destination: Ipv4Addr) -> Result<Vec<String>, TraceError> {
        let mut current = from.to_string();
        let mut path = vec![current.clone()];
        let mut visited = HashSet::from([current.clone()]);

        loop {
            let state = self
                .nodes
                .get(&current)
                .ok_or_else(|| TraceError::UnknownNode {
                    node: current.clone(),
                })?;

            if state.owns(destination) {
                return Ok(path);
            }

            if current != from && !state.forwarding {
                return Err(TraceError::NotForwarding {
                    node: current,
                    destination,
                });
            }

            let candidates = state.next_hops(destination);
            let Some(&first_candidate) = candidates.first() else {
                return Err(TraceError::NoRoute {
                    node: current,
                    destination,
                });
            };

            let Some(next) = candidates
                .iter()
                .find_map(|hop| self.neighbor_owning(&current, *hop))
            else {
                return Err(TraceError::NextHopUnreachable {
                    node: current,
                    next_hop: first_candidate,
                });
            };

            path.push(next.clone());
            if !visited.insert(next.clone()) {
                return Err(TraceError::Loop { destination, path });
            }

            current = next;
        }
    }

    /// The node sharing a segment with `node` that owns `address`
    fn neighbor_owning(&self, node: &str, address: Ipv4Addr) -> Option<String> {
        self.segments
            .iter()
            .filter(|s| s.has_member(node))
            .find_map(|s| s.owner_of(address).filter(|a| a.node != node))
            .map(|a| a.node.clone())
    }

    fn configurable_node(
        &mut self,
        node: &str,
        command: &str,
    ) -> Result<&mut NodeState, CommandExecutionError> {
        if !self.running {
            return Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::NotRunning,
            ));
        }

        match self.nodes.get_mut(node) {
            None => Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::UnknownNode,
            )),
            Some(state) if state.kind == NodeKind::Switch => Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::NotConfigurable,
            )),
            Some(state) => Ok(state),
        }
    }
}

impl EmulationBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn start(&mut self, topology: &Topology) -> Result<(), CommandExecutionError> {
        if self.running {
            return Err(CommandExecutionError::new(
                EMULATION,
                "start",
                CommandFailure::AlreadyRunning,
            ));
        }

        self.nodes = topology
            .nodes()
            .iter()
            .map(|n| {
                let state = NodeState {
                    kind: n.kind,
                    interfaces: n.interfaces.clone(),
                    forwarding: false,
                    routes: BTreeMap::new(),
                    default_nexthops: n.gateway.into_iter().collect(),
                };
                (n.id.clone(), state)
            })
            .collect();
        self.segments = topology.segments().to_vec();
        self.running = true;

        info!(
            nodes = self.nodes.len(),
            segments = self.segments.len(),
            "in-memory emulation started"
        );
        Ok(())
    }

    fn apply(&mut self, node: &str, change: &ConfigChange) -> Result<(), CommandExecutionError> {
        let command = change.to_string();
        let state = self.configurable_node(node, &command)?;

        let nexthops: &[Ipv4Addr] = match change {
            ConfigChange::AddRoute(route) => std::slice::from_ref(&route.next),
            ConfigChange::AddDefaultRoute { nexthops } => nexthops.as_slice(),
            _ => &[],
        };
        if let Some(hop) = nexthops.iter().find(|&&hop| !state.is_on_link(hop)) {
            return Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::Rejected(format!("next hop {hop} is not on-link")),
            ));
        }

        match change {
            ConfigChange::EnableForwarding => state.forwarding = true,
            ConfigChange::DisableForwarding => state.forwarding = false,
            ConfigChange::AddRoute(route) => {
                state.routes.insert(route.destination, route.next);
            }
            ConfigChange::AddDefaultRoute { nexthops } => {
                if nexthops.is_empty() {
                    return Err(CommandExecutionError::new(
                        node,
                        command,
                        CommandFailure::Rejected(
                            "a default route needs at least one next hop".to_string(),
                        ),
                    ));
                }

                state.default_nexthops = nexthops.clone();
            }
        }

        debug!(node, %command, "change applied");
        Ok(())
    }

    fn execute(&mut self, node: &str, command: &str) -> Result<String, CommandExecutionError> {
        let words: Vec<&str> = command.split_whitespace().collect();
        let state = self.configurable_node(node, command)?;

        match words.as_slice() {
            ["ip", "route"] | ["ip", "route", "show"] | ["route"] => Ok(state.route_table()),
            ["ip", "addr"] | ["ip", "address"] | ["ip", "addr", "show"] => Ok(state.addresses()),
            ["sysctl", "net.ipv4.ip_forward"] => Ok(format!(
                "net.ipv4.ip_forward = {}\n",
                u8::from(state.forwarding)
            )),
            _ => Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::Unsupported,
            )),
        }
    }

    fn stop(&mut self) -> Result<(), CommandExecutionError> {
        if !self.running {
            return Err(CommandExecutionError::new(
                EMULATION,
                "stop",
                CommandFailure::NotRunning,
            ));
        }

        self.running = false;
        info!("in-memory emulation stopped");
        Ok(())
    }
}
