use lab_network::routing::derive::RoutingPlan;
use lab_network::routing::facts::RoutingFacts;
use lab_network::topology::Topology;
use lab_network::topology::spec::NodeKind;
use lab_network::{ConfigChange, EmulationBackend, EmulationSession};

pub fn print_topology(topology: &Topology) {
    println!("--- Topology ---");
    for (label, kind) in [
        ("Routers", NodeKind::Router),
        ("Switches", NodeKind::Switch),
        ("Hosts", NodeKind::Host),
    ] {
        let names: Vec<_> = topology
            .nodes_of_kind(kind)
            .map(|n| n.id.as_str())
            .collect();
        println!("* {label}: {}", names.join(", "));
    }

    println!("* Links: {}", topology.links().len());
    for link in topology.links() {
        println!("  | {link}");
    }

    println!("--- Hosts ---");
    for host in topology.hosts() {
        let addresses: Vec<_> = host.interfaces.iter().map(|i| i.address.to_string()).collect();
        match host.gateway {
            Some(gateway) => {
                println!("* {}: {} (gateway {gateway})", host.id, addresses.join(", "))
            }
            None => println!("* {}: {}", host.id, addresses.join(", ")),
        }
    }
}

pub fn print_routing_facts(facts: &RoutingFacts) {
    println!("--- Routing facts ---");
    for host_subnet in &facts.host_subnets {
        println!(
            "* {} serves {} (gateway {})",
            host_subnet.router, host_subnet.subnet, host_subnet.gateway
        );
    }
    for adjacency in &facts.adjacencies {
        println!(
            "* {} ({}) <-> {} ({}) on {}",
            adjacency.a, adjacency.a_address, adjacency.b, adjacency.b_address, adjacency.subnet
        );
    }
}

pub fn print_plan(plan: &RoutingPlan) {
    println!("--- Routes ---");
    for (router, routes) in plan.iter() {
        println!("* {router}");
        if routes.is_empty() {
            println!("  | no routes");
        }
        for route in routes {
            println!("  | {route}");
        }
    }
}

/// Prints every command a session runs to realize the plan, in the order it runs them
pub fn print_commands(topology: &Topology, plan: &RoutingPlan) {
    println!("--- Commands ---");
    let mut routers: Vec<_> = topology.routers().map(|r| r.id.as_str()).collect();
    routers.sort();

    for router in &routers {
        println!("{router}: {}", ConfigChange::EnableForwarding);
    }
    for (router, change) in plan.changes() {
        println!("{router}: {change}");
    }
}

/// Prints the live routing table of every router, as reported by the backend
pub fn print_routing_tables<B: EmulationBackend>(
    session: &mut EmulationSession<B>,
) -> anyhow::Result<()> {
    println!("--- Routing tables ---");
    for router in session.routers().to_vec() {
        let table = session.execute(&router, "ip route")?;
        println!("* {router}");
        for line in table.lines() {
            println!("  | {line}");
        }
    }

    Ok(())
}
