//! The reference lab: three routers in a triangle, each serving two hosts
//!
//! ```text
//!   H1 H2            H3 H4
//!    \ /              \ /
//!    S1               S2
//!     |                |
//!    R1 ---- S4 ---- R2
//!      \            /
//!       S6        S5
//!         \      /
//!           R3
//!            |
//!           S3
//!           / \
//!         H5   H6
//! ```
//!
//! | Subnet        | Segment | Addresses                                  |
//! |---------------|---------|--------------------------------------------|
//! | `10.0.1.0/24` | S1      | R1 `.254`, H1 `.1`, H2 `.2`                |
//! | `10.0.2.0/24` | S2      | R2 `.254`, H3 `.1`, H4 `.2`                |
//! | `10.0.3.0/24` | S3      | R3 `.254`, H5 `.1`, H6 `.2`                |
//! | `10.0.4.0/24` | S4      | R1 `.1`, R2 `.2`                           |
//! | `10.0.5.0/24` | S5      | R2 `.1`, R3 `.2`                           |
//! | `10.0.6.0/24` | S6      | R1 `.1`, R3 `.2`                           |

use crate::error::ConfigurationError;
use crate::topology::ip::Ipv4Cidr;
use crate::topology::spec::LinkEndpoint;
use crate::topology::{Topology, TopologyBuilder};
use std::net::Ipv4Addr;

const ROUTERS: [&str; 3] = ["R1", "R2", "R3"];
const SWITCHES: [&str; 6] = ["S1", "S2", "S3", "S4", "S5", "S6"];

/// Inter-router segments: (switch, router, interface, address)
const ROUTER_LINKS: [(&str, &str, &str, [u8; 4]); 6] = [
    ("S4", "R1", "R1-eth2", [10, 0, 4, 1]),
    ("S4", "R2", "R2-eth2", [10, 0, 4, 2]),
    ("S5", "R2", "R2-eth3", [10, 0, 5, 1]),
    ("S5", "R3", "R3-eth2", [10, 0, 5, 2]),
    ("S6", "R1", "R1-eth3", [10, 0, 6, 1]),
    ("S6", "R3", "R3-eth3", [10, 0, 6, 2]),
];

const SUBNET_PREFIX: u8 = 24;
const GATEWAY_HOST_PART: u8 = 254;

pub fn triangle() -> Result<Topology, ConfigurationError> {
    triangle_builder().build()
}

pub fn triangle_builder() -> TopologyBuilder {
    let mut builder = Topology::builder();
    for router in ROUTERS {
        builder.add_router(router);
    }
    for switch in SWITCHES {
        builder.add_switch(switch);
    }

    // Router i serves 10.0.i.0/24 through S{i}
    for (i, router) in ROUTERS.iter().enumerate() {
        let subnet = i as u8 + 1;
        builder.add_link(
            LinkEndpoint::node(SWITCHES[i]),
            LinkEndpoint::interface(
                *router,
                format!("{router}-eth1"),
                cidr([10, 0, subnet, GATEWAY_HOST_PART]),
            ),
        );
    }

    for (i, switch) in SWITCHES.iter().take(ROUTERS.len()).enumerate() {
        let subnet = i as u8 + 1;
        let gateway = Ipv4Addr::new(10, 0, subnet, GATEWAY_HOST_PART);
        for host_part in 1..=2 {
            let host = format!("H{}", 2 * i as u8 + host_part);
            builder
                .add_host(host.clone(), cidr([10, 0, subnet, host_part]), gateway)
                .add_link(LinkEndpoint::node(host), LinkEndpoint::node(*switch));
        }
    }

    for (switch, router, interface, address) in ROUTER_LINKS {
        builder.add_link(
            LinkEndpoint::node(switch),
            LinkEndpoint::interface(router, interface, cidr(address)),
        );
    }

    builder
}

fn cidr(octets: [u8; 4]) -> Ipv4Cidr {
    Ipv4Cidr {
        address: Ipv4Addr::from(octets),
        network_prefix: SUBNET_PREFIX,
    }
}
