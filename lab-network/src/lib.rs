pub mod backend;
pub mod change;
pub mod error;
pub mod routing;
pub mod session;
pub mod topology;

pub use crate::backend::EmulationBackend;
pub use crate::change::ConfigChange;
pub use crate::error::{CommandExecutionError, CommandFailure, ConfigurationError, SetupError};
pub use crate::routing::derive::{RoutingPlan, derive_routes};
pub use crate::routing::facts::RoutingFacts;
pub use crate::session::EmulationSession;
pub use crate::topology::Topology;
