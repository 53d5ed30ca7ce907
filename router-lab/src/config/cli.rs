use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(about = "Emulates a small routed network and installs its static routes")]
pub struct CliOpt {
    /// Path to a JSON file describing the topology (the built-in triangle lab is used when absent)
    #[arg(long, global = true)]
    pub topology: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the topology, the routing facts extracted from it and the routes derived from them
    Plan,
    /// Start the emulation, install the routes and open an interactive shell
    Run(RunOpt),
}

#[derive(Parser, Debug, Clone)]
pub struct RunOpt {
    /// The emulation engine
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    /// Prefix of the network namespaces created by the `netns` backend
    #[arg(long, default_value = lab_network::backend::netns::DEFAULT_PREFIX)]
    pub netns_prefix: String,

    /// Replace the default route of the given host by a multipath route over every router
    /// address on its segments
    #[arg(long)]
    pub multipath_demo: Option<String>,

    /// Tear the emulation down right after the routes are installed, instead of opening a shell
    #[arg(long)]
    pub no_shell: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Keep every node in memory (no privileges required)
    Memory,
    /// Create Linux network namespaces, bridges and veth pairs (requires root)
    Netns,
}
