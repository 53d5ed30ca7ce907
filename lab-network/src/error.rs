use crate::routing::route::IpRange;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A malformed topology or routing table, detected before anything is emulated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("node `{node}` is declared more than once")]
    DuplicateNode { node: String },
    #[error("link `{link}` references node `{node}`, which does not exist")]
    UnknownNode { link: String, node: String },
    #[error("link `{link}` connects node `{node}` to itself")]
    SelfLink { link: String, node: String },
    #[error("link `{link}` assigns an interface or address to switch `{switch}`")]
    AddressOnSwitch { link: String, switch: String },
    #[error("link `{link}` attaches node `{node}` without an address")]
    MissingAddress { link: String, node: String },
    #[error("node `{node}` has more than one interface named `{interface}`")]
    DuplicateInterface { node: String, interface: String },
    #[error("address {address} is assigned to both `{first}` and `{second}`")]
    DuplicateAddress {
        address: Ipv4Addr,
        first: String,
        second: String,
    },
    #[error("default gateway {gateway} of host `{host}` is outside of the host's subnets")]
    GatewayOutsideSubnet { host: String, gateway: Ipv4Addr },
    #[error("default gateway {gateway} of host `{host}` is not a router on the host's segment")]
    GatewayNotARouter { host: String, gateway: Ipv4Addr },
    #[error("segment `{segment}` mixes subnets {first} and {second}")]
    MixedSubnets {
        segment: String,
        first: IpRange,
        second: IpRange,
    },
    #[error(
        "segment `{segment}` has {routers} router(s) and {hosts} host(s), but a segment must \
         either serve hosts through exactly one router or join exactly two routers"
    )]
    UnsupportedSegment {
        segment: String,
        routers: usize,
        hosts: usize,
    },
    #[error("routers `{a}` and `{b}` share more than one subnet ({first} and {second})")]
    DuplicateAdjacency {
        a: String,
        b: String,
        first: IpRange,
        second: IpRange,
    },
    #[error("router `{router}` has no path towards subnet {subnet} (served by `{owner}`)")]
    UnreachableSubnet {
        router: String,
        subnet: IpRange,
        owner: String,
    },
    #[error("node `{node}` is not a host")]
    NotAHost { node: String },
}

/// A command (or typed configuration change) that could not be carried out on a live node
#[derive(Error, Debug)]
#[error("`{command}` failed on `{node}`: {reason}")]
pub struct CommandExecutionError {
    pub node: String,
    pub command: String,
    pub reason: CommandFailure,
}

impl CommandExecutionError {
    pub fn new(
        node: impl Into<String>,
        command: impl Into<String>,
        reason: CommandFailure,
    ) -> Self {
        Self {
            node: node.into(),
            command: command.into(),
            reason,
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandFailure {
    #[error("the emulation is not running")]
    NotRunning,
    #[error("the emulation is already running")]
    AlreadyRunning,
    #[error("no such node")]
    UnknownNode,
    #[error("switches cannot be configured")]
    NotConfigurable,
    #[error("unsupported command")]
    Unsupported,
    #[error("{0}")]
    Rejected(String),
    #[error("failed to spawn process")]
    Spawn(#[source] std::io::Error),
    #[error("process exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
}

/// Anything that aborts the setup of an emulation session
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Command(#[from] CommandExecutionError),
}
