use crate::backend::EmulationBackend;
use crate::change::ConfigChange;
use crate::error::{CommandExecutionError, SetupError};
use crate::routing::derive::RoutingPlan;
use crate::topology::Topology;
use tracing::{debug, info, warn};

/// A running emulation
///
/// Teardown happens exactly once, through [`EmulationSession::finish`] or when the session is
/// dropped.
pub struct EmulationSession<B: EmulationBackend> {
    /// Always `Some`, except while tearing down
    backend: Option<B>,
    topology: Topology,
    /// Router names, sorted
    routers: Vec<String>,
}

impl<B: EmulationBackend> EmulationSession<B> {
    /// Starts the backend and enables forwarding on every router
    ///
    /// If any step fails, whatever was started is torn down before the error is returned.
    pub fn start(mut backend: B, topology: &Topology) -> Result<Self, SetupError> {
        info!(backend = backend.name(), "starting emulation");
        if let Err(e) = backend.start(topology) {
            if let Err(stop_error) = backend.stop() {
                warn!("failed to stop backend after a failed start: {stop_error}");
            }
            return Err(e.into());
        }

        let mut routers: Vec<_> = topology.routers().map(|r| r.id.clone()).collect();
        routers.sort();

        // From here on, dropping the session tears the backend down
        let mut session = Self {
            backend: Some(backend),
            topology: topology.clone(),
            routers,
        };

        for router in session.routers.clone() {
            session.apply(&router, &ConfigChange::EnableForwarding)?;
        }

        info!(routers = session.routers.len(), "forwarding enabled");
        Ok(session)
    }

    /// Installs every route of the plan, one router at a time in name order
    ///
    /// Installing the same plan twice leaves the routing tables unchanged.
    pub fn install_routes(&mut self, plan: &RoutingPlan) -> Result<(), CommandExecutionError> {
        for (router, change) in plan.changes() {
            self.apply(router, &change)?;
        }

        info!(routes = plan.route_count(), "routes installed");
        Ok(())
    }

    pub fn apply(
        &mut self,
        node: &str,
        change: &ConfigChange,
    ) -> Result<(), CommandExecutionError> {
        debug!(node, %change, "applying change");
        self.backend_mut().apply(node, change)
    }

    pub fn execute(&mut self, node: &str, command: &str) -> Result<String, CommandExecutionError> {
        debug!(node, command, "executing command");
        self.backend_mut().execute(node, command)
    }

    pub fn backend(&self) -> &B {
        self.backend
            .as_ref()
            .expect("backend is only taken during teardown")
    }

    fn backend_mut(&mut self) -> &mut B {
        self.backend
            .as_mut()
            .expect("backend is only taken during teardown")
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn routers(&self) -> &[String] {
        &self.routers
    }

    /// Disables forwarding on every router and stops the backend, handing it back
    ///
    /// Teardown continues past failures; the first one is reported.
    pub fn finish(mut self) -> Result<B, CommandExecutionError> {
        let mut backend = self
            .backend
            .take()
            .expect("backend is only taken during teardown");
        teardown(&mut backend, &self.routers)?;
        Ok(backend)
    }
}

impl<B: EmulationBackend> Drop for EmulationSession<B> {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = teardown(&mut backend, &self.routers) {
                warn!("emulation teardown failed: {e}");
            }
        }
    }
}

fn teardown<B: EmulationBackend>(
    backend: &mut B,
    routers: &[String],
) -> Result<(), CommandExecutionError> {
    let mut first_error = None;
    for router in routers {
        if let Err(e) = backend.apply(router, &ConfigChange::DisableForwarding) {
            warn!(router, "failed to disable forwarding: {e}");
            first_error.get_or_insert(e);
        }
    }

    if let Err(e) = backend.stop() {
        first_error.get_or_insert(e);
    }

    info!(backend = backend.name(), "emulation stopped");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
