pub mod in_memory;
pub mod netns;

use crate::change::ConfigChange;
use crate::error::CommandExecutionError;
use crate::topology::Topology;

/// Node name used in errors that concern the emulation as a whole
pub const EMULATION: &str = "emulation";

pub trait EmulationBackend {
    /// A short human-readable name
    fn name(&self) -> &'static str;

    /// Realizes the topology as live nodes and links, with host addresses and default gateways
    /// already configured
    fn start(&mut self, topology: &Topology) -> Result<(), CommandExecutionError>;

    /// Applies a configuration change to a live router or host
    fn apply(&mut self, node: &str, change: &ConfigChange) -> Result<(), CommandExecutionError>;

    /// Runs a command on a live router or host and returns its output
    fn execute(&mut self, node: &str, command: &str) -> Result<String, CommandExecutionError>;

    /// Tears the emulation down
    fn stop(&mut self) -> Result<(), CommandExecutionError>;
}
