use crate::routing::route::Route;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// A typed mutation of a live node
///
/// Every change renders as the exact command line it stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigChange {
    /// Let the node forward packets between its interfaces
    EnableForwarding,
    DisableForwarding,
    /// Add (or replace) a route to a subnet
    AddRoute(Route),
    /// Add (or replace) the default route, spreading traffic over one or more next hops
    AddDefaultRoute { nexthops: Vec<Ipv4Addr> },
}

impl ConfigChange {
    /// The argument vector of the equivalent Linux command
    ///
    /// Routes use `ip route replace`, which makes applying the same change twice harmless.
    pub fn args(&self) -> Vec<String> {
        match self {
            ConfigChange::EnableForwarding => sysctl_ip_forward(true),
            ConfigChange::DisableForwarding => sysctl_ip_forward(false),
            ConfigChange::AddRoute(route) => vec![
                "ip".to_string(),
                "route".to_string(),
                "replace".to_string(),
                route.destination.to_string(),
                "via".to_string(),
                route.next.to_string(),
            ],
            ConfigChange::AddDefaultRoute { nexthops } => {
                let mut args = vec![
                    "ip".to_string(),
                    "route".to_string(),
                    "replace".to_string(),
                    "default".to_string(),
                ];

                if let [nexthop] = nexthops.as_slice() {
                    args.extend(["via".to_string(), nexthop.to_string()]);
                } else {
                    for nexthop in nexthops {
                        args.extend([
                            "nexthop".to_string(),
                            "via".to_string(),
                            nexthop.to_string(),
                        ]);
                    }
                }

                args
            }
        }
    }
}

fn sysctl_ip_forward(enabled: bool) -> Vec<String> {
    vec![
        "sysctl".to_string(),
        "-w".to_string(),
        format!("net.ipv4.ip_forward={}", u8::from(enabled)),
    ]
}

impl Display for ConfigChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}
