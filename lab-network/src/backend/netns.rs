//! Emulation on top of Linux network namespaces
//!
//! Every router and host gets its own namespace (`<prefix><node>`). Switches become bridges inside
//! a shared `<prefix>sw` namespace, so nothing is created in the root namespace. Each link is a
//! veth pair. Everything is driven through the `ip` tool, which requires root privileges.

use crate::backend::{EMULATION, EmulationBackend};
use crate::change::ConfigChange;
use crate::error::{CommandExecutionError, CommandFailure};
use crate::topology::Topology;
use crate::topology::spec::{LinkEndpoint, NodeKind};
use std::collections::HashMap;
use std::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_PREFIX: &str = "rl-";
const SWITCH_NAMESPACE: &str = "sw";

/// Runs external programs on behalf of the backend
pub trait CommandRunner {
    /// Runs `program` with `args` to completion, returning its standard output
    fn run(&mut self, program: &str, args: &[String]) -> Result<String, CommandFailure>;
}

/// Spawns real processes
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<String, CommandFailure> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(CommandFailure::Spawn)?;

        if !output.status.success() {
            return Err(CommandFailure::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub struct NamespaceBackend<R = SystemRunner> {
    runner: R,
    prefix: String,
    kinds: HashMap<String, NodeKind>,
    /// Namespaces created so far, in creation order
    namespaces: Vec<String>,
    running: bool,
}

impl NamespaceBackend<SystemRunner> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_runner(prefix, SystemRunner)
    }
}

impl<R: CommandRunner> NamespaceBackend<R> {
    pub fn with_runner(prefix: impl Into<String>, runner: R) -> Self {
        Self {
            runner,
            prefix: prefix.into(),
            kinds: HashMap::new(),
            namespaces: Vec::new(),
            running: false,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The namespace holding `node` (all switches share one)
    pub fn namespace(&self, node: &str) -> String {
        match self.kinds.get(node) {
            Some(NodeKind::Switch) => self.switch_namespace(),
            _ => format!("{}{node}", self.prefix),
        }
    }

    fn switch_namespace(&self) -> String {
        format!("{}{SWITCH_NAMESPACE}", self.prefix)
    }

    fn ip(&mut self, node: &str, args: Vec<String>) -> Result<String, CommandExecutionError> {
        let command = format!("ip {}", args.join(" "));
        debug!(node, %command, "running");
        self.runner
            .run("ip", &args)
            .map_err(|reason| CommandExecutionError::new(node, command, reason))
    }

    fn ip_in(&mut self, node: &str, args: &[&str]) -> Result<String, CommandExecutionError> {
        let mut full_args = vec!["-n".to_string(), self.namespace(node)];
        full_args.extend(args.iter().map(|a| a.to_string()));
        self.ip(node, full_args)
    }

    fn add_namespace(
        &mut self,
        node: &str,
        namespace: String,
    ) -> Result<(), CommandExecutionError> {
        self.ip(node, vec!["netns".to_string(), "add".to_string(), namespace.clone()])?;
        self.namespaces.push(namespace);
        self.ip_in(node, &["link", "set", "lo", "up"])?;
        Ok(())
    }

    /// The device name used for an endpoint of the link with the given index
    ///
    /// Router and host endpoints use their interface name. Switch endpoints are named after the
    /// switch and the link index, which keeps them unique within the shared switch namespace.
    fn device_name(&self, endpoint: &LinkEndpoint, link_index: usize) -> String {
        match &endpoint.interface {
            Some(interface) if self.kinds.get(&endpoint.node) != Some(&NodeKind::Switch) => {
                interface.clone()
            }
            _ => format!("{}-p{link_index}", endpoint.node),
        }
    }

    fn create_link(
        &mut self,
        a: &LinkEndpoint,
        b: &LinkEndpoint,
        link_index: usize,
    ) -> Result<(), CommandExecutionError> {
        let a_device = self.device_name(a, link_index);
        let b_device = self.device_name(b, link_index);
        let b_namespace = self.namespace(&b.node);
        self.ip_in(
            &a.node,
            &[
                "link",
                "add",
                &a_device,
                "type",
                "veth",
                "peer",
                "name",
                &b_device,
                "netns",
                &b_namespace,
            ],
        )?;

        for (endpoint, device) in [(a, a_device), (b, b_device)] {
            if self.kinds.get(&endpoint.node) == Some(&NodeKind::Switch) {
                self.ip_in(&endpoint.node, &["link", "set", &device, "master", &endpoint.node])?;
            }
            if let Some(address) = endpoint.address {
                let address = address.to_string();
                self.ip_in(&endpoint.node, &["addr", "add", &address, "dev", &device])?;
            }
            self.ip_in(&endpoint.node, &["link", "set", &device, "up"])?;
        }

        Ok(())
    }

    fn configurable_namespace(
        &self,
        node: &str,
        command: &str,
    ) -> Result<String, CommandExecutionError> {
        if !self.running {
            return Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::NotRunning,
            ));
        }

        match self.kinds.get(node) {
            None => Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::UnknownNode,
            )),
            Some(NodeKind::Switch) => Err(CommandExecutionError::new(
                node,
                command,
                CommandFailure::NotConfigurable,
            )),
            Some(_) => Ok(self.namespace(node)),
        }
    }

    fn exec_in(
        &mut self,
        node: &str,
        command: &str,
        args: Vec<String>,
    ) -> Result<String, CommandExecutionError> {
        let namespace = self.configurable_namespace(node, command)?;
        let mut full_args = vec!["netns".to_string(), "exec".to_string(), namespace];
        full_args.extend(args);
        self.ip(node, full_args)
    }
}

impl<R: CommandRunner> EmulationBackend for NamespaceBackend<R> {
    fn name(&self) -> &'static str {
        "network namespaces"
    }

    fn start(&mut self, topology: &Topology) -> Result<(), CommandExecutionError> {
        if self.running || !self.namespaces.is_empty() {
            return Err(CommandExecutionError::new(
                EMULATION,
                "start",
                CommandFailure::AlreadyRunning,
            ));
        }

        self.kinds = topology
            .nodes()
            .iter()
            .map(|n| (n.id.clone(), n.kind))
            .collect();

        let switches: Vec<&str> = topology
            .nodes_of_kind(NodeKind::Switch)
            .map(|n| n.id.as_str())
            .collect();
        if let Some(first_switch) = switches.first() {
            let namespace = self.switch_namespace();
            self.add_namespace(first_switch, namespace)?;
        }
        for switch in &switches {
            self.ip_in(switch, &["link", "add", switch, "type", "bridge"])?;
            self.ip_in(switch, &["link", "set", switch, "up"])?;
        }

        for node in topology.nodes().iter().filter(|n| n.kind != NodeKind::Switch) {
            let namespace = self.namespace(&node.id);
            self.add_namespace(&node.id, namespace)?;
        }

        for (i, link) in topology.links().iter().enumerate() {
            self.create_link(&link.a, &link.b, i)?;
        }

        for host in topology.hosts() {
            if let Some(gateway) = host.gateway {
                let gateway = gateway.to_string();
                self.ip_in(&host.id, &["route", "add", "default", "via", &gateway])?;
            }
        }

        self.running = true;
        info!(
            namespaces = self.namespaces.len(),
            links = topology.links().len(),
            "network namespaces ready"
        );
        Ok(())
    }

    fn apply(&mut self, node: &str, change: &ConfigChange) -> Result<(), CommandExecutionError> {
        self.exec_in(node, &change.to_string(), change.args())?;
        Ok(())
    }

    fn execute(&mut self, node: &str, command: &str) -> Result<String, CommandExecutionError> {
        let args = command.split_whitespace().map(str::to_string).collect();
        self.exec_in(node, command, args)
    }

    /// Deletes every namespace created by `start`, which also removes their devices
    ///
    /// Deletion continues past failures; the first one is reported.
    fn stop(&mut self) -> Result<(), CommandExecutionError> {
        if !self.running && self.namespaces.is_empty() {
            return Err(CommandExecutionError::new(
                EMULATION,
                "stop",
                CommandFailure::NotRunning,
            ));
        }

        let mut first_error = None;
        while let Some(namespace) = self.namespaces.pop() {
            let args = vec!["netns".to_string(), "del".to_string(), namespace.clone()];
            if let Err(e) = self.ip(EMULATION, args) {
                warn!(%namespace, "failed to delete namespace: {e}");
                first_error.get_or_insert(e);
            }
        }

        self.running = false;
        info!("network namespaces removed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::ip::Ipv4Cidr;
    use crate::topology::triangle::triangle;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    /// Records every invocation, failing those that contain `fail_on`
    #[derive(Default)]
    struct RecordingRunner {
        invocations: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&mut self, program: &str, args: &[String]) -> Result<String, CommandFailure> {
            let invocation = format!("{program} {}", args.join(" "));
            let failed = self.fail_on.is_some_and(|f| invocation.contains(f));
            self.invocations.push(invocation);

            if failed {
                Err(CommandFailure::ExitStatus {
                    code: Some(2),
                    stderr: "RTNETLINK answers: File exists".to_string(),
                })
            } else {
                Ok(String::new())
            }
        }
    }

    fn small_topology() -> Topology {
        let cidr = |s| Ipv4Cidr::from_str(s).unwrap();
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
        builder.build().unwrap()
    }

    #[test]
    fn test_start_realizes_topology() {
        let mut backend = NamespaceBackend::with_runner("t-", RecordingRunner::default());
        backend.start(&small_topology()).unwrap();

        let expected = [
            "ip netns add t-sw",
            "ip -n t-sw link set lo up",
            "ip -n t-sw link add S1 type bridge",
            "ip -n t-sw link set S1 up",
            "ip netns add t-R1",
            "ip -n t-R1 link set lo up",
            "ip netns add t-H1",
            "ip -n t-H1 link set lo up",
            "ip -n t-sw link add S1-p0 type veth peer name R1-eth1 netns t-R1",
            "ip -n t-sw link set S1-p0 master S1",
            "ip -n t-sw link set S1-p0 up",
            "ip -n t-R1 addr add 10.0.1.254/24 dev R1-eth1",
            "ip -n t-R1 link set R1-eth1 up",
            "ip -n t-H1 link add H1-eth0 type veth peer name S1-p1 netns t-sw",
            "ip -n t-H1 addr add 10.0.1.1/24 dev H1-eth0",
            "ip -n t-H1 link set H1-eth0 up",
            "ip -n t-sw link set S1-p1 master S1",
            "ip -n t-sw link set S1-p1 up",
            "ip -n t-H1 route add default via 10.0.1.254",
        ];
        assert_eq!(backend.runner().invocations, expected);
    }

    #[test]
    fn test_changes_run_inside_the_namespace() {
        let mut backend = NamespaceBackend::with_runner("t-", RecordingRunner::default());
        backend.start(&triangle().unwrap()).unwrap();
        let realized = backend.runner().invocations.len();

        backend
            .apply("R1", &ConfigChange::EnableForwarding)
            .unwrap();
        backend.execute("R1", "ip route").unwrap();

        assert_eq!(
            backend.runner().invocations[realized..],
            [
                "ip netns exec t-R1 sysctl -w net.ipv4.ip_forward=1",
                "ip netns exec t-R1 ip route",
            ]
        );

        let error = backend
            .apply("S4", &ConfigChange::EnableForwarding)
            .unwrap_err();
        assert!(matches!(error.reason, CommandFailure::NotConfigurable));
    }

    #[test]
    fn test_stop_removes_every_namespace() {
        let mut backend = NamespaceBackend::with_runner("t-", RecordingRunner::default());
        backend.start(&triangle().unwrap()).unwrap();
        let realized = backend.runner().invocations.len();

        backend.stop().unwrap();

        let deleted = &backend.runner().invocations[realized..];
        // One namespace for the switches plus one per router and host
        assert_eq!(deleted.len(), 1 + 3 + 6);
        assert_eq!(deleted.first().unwrap(), "ip netns del t-H6");
        assert_eq!(deleted.last().unwrap(), "ip netns del t-sw");
        assert!(matches!(
            backend.stop().unwrap_err().reason,
            CommandFailure::NotRunning
        ));
    }

    #[test]
    fn test_failed_start_can_still_be_cleaned_up() {
        let runner = RecordingRunner {
            fail_on: Some("netns add t-R2"),
            ..Default::default()
        };
        let mut backend = NamespaceBackend::with_runner("t-", runner);

        let error = backend.start(&triangle().unwrap()).unwrap_err();
        assert_eq!(error.node, "R2");
        assert!(matches!(error.reason, CommandFailure::ExitStatus { code: Some(2), .. }));

        backend.stop().unwrap();
        let invocations = &backend.runner().invocations;
        assert_eq!(
            invocations[invocations.len() - 2..],
            ["ip netns del t-R1", "ip netns del t-sw"]
        );
    }
}
