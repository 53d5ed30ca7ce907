mod config;
mod shell;
mod util;

use crate::config::cli::{Backend, CliOpt, Command, RunOpt};
use crate::config::topology::load_topology;
use crate::shell::{ShellBackend, run_shell};
use anyhow::{Context, bail};
use clap::Parser;
use lab_network::backend::in_memory::InMemoryBackend;
use lab_network::backend::netns::NamespaceBackend;
use lab_network::routing::derive::{RoutingPlan, derive_routes};
use lab_network::routing::facts::RoutingFacts;
use lab_network::topology::Topology;
use lab_network::topology::triangle::triangle;
use lab_network::{ConfigChange, EmulationSession};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let options = CliOpt::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let topology = match &options.topology {
        Some(path) => load_topology(path)?,
        None => triangle().context("the built-in triangle topology is invalid")?,
    };
    let facts =
        RoutingFacts::from_topology(&topology).context("failed to extract routing facts")?;
    let plan = derive_routes(&facts).context("failed to derive routes")?;

    match &options.command {
        Command::Plan => {
            util::print_topology(&topology);
            util::print_routing_facts(&facts);
            util::print_plan(&plan);
            util::print_commands(&topology, &plan);
        }
        Command::Run(run_options) => match run_options.backend {
            Backend::Memory => run(InMemoryBackend::new(), &topology, &plan, run_options)?,
            Backend::Netns => run(
                NamespaceBackend::new(run_options.netns_prefix.clone()),
                &topology,
                &plan,
                run_options,
            )?,
        },
    }

    Ok(())
}

fn run<B: ShellBackend>(
    backend: B,
    topology: &Topology,
    plan: &RoutingPlan,
    options: &RunOpt,
) -> anyhow::Result<()> {
    println!("--- Emulation ---");
    println!("* Backend: {}", backend.name());

    // Dropping the session on any error below tears the emulation down
    let mut session =
        EmulationSession::start(backend, topology).context("failed to start the emulation")?;
    session
        .install_routes(plan)
        .context("failed to install routes")?;
    println!("* Routes installed: {}", plan.route_count());

    if let Some(host) = &options.multipath_demo {
        let nexthops = topology.gateways_of(host);
        if nexthops.is_empty() {
            bail!("`{host}` is not a host with a default gateway");
        }

        let change = ConfigChange::AddDefaultRoute { nexthops };
        session
            .apply(host, &change)
            .context("failed to install the multipath default route")?;
        println!("* {host}: {change}");
    }

    util::print_routing_tables(&mut session)?;

    if !options.no_shell {
        info!("attaching shell");
        let stdin = std::io::stdin();
        run_shell(&mut session, stdin.lock(), std::io::stdout())?;
    }

    session.finish().context("failed to tear the emulation down")?;
    println!("--- Done ---");
    Ok(())
}
