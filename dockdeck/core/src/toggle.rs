//! Start/stop a whole compose project or swarm stack with one action.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{info, instrument, warn};

use crate::{
    context::ContextKey,
    docker::{DockerClient, SwarmService},
    error::{Error, Result},
};

/// Replica count used when scaling up a service we never saw scaled down.
pub const DEFAULT_REPLICAS: u64 = 1;

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Started the stopped members of a compose stack.
    Started { containers: usize },
    /// Stopped every member of a fully running compose stack.
    Stopped { containers: usize },
    /// Scaled the replicated services of a swarm stack to zero.
    ScaledDown { services: usize },
    /// Restored the replicated services of a swarm stack.
    ScaledUp { services: usize },
    /// No container or service belongs to the stack.
    NotFound,
}

impl fmt::Display for ToggleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleOutcome::Started { containers } => write!(f, "started {containers} container(s)"),
            ToggleOutcome::Stopped { containers } => write!(f, "stopped {containers} container(s)"),
            ToggleOutcome::ScaledDown { services } => write!(f, "scaled {services} service(s) to 0"),
            ToggleOutcome::ScaledUp { services } => write!(f, "scaled {services} service(s) up"),
            ToggleOutcome::NotFound => f.write_str("stack not found"),
        }
    }
}

type ReplicaKey = (ContextKey, String);

/// Flips stacks between running and stopped.
///
/// Swarm services are scaled rather than stopped, so the replica count each
/// service had before being scaled down is remembered (per context and
/// service) for the next scale up. The memory lives as long as the toggler.
#[derive(Debug, Clone)]
pub struct StackToggler {
    docker: DockerClient,
    replicas: Arc<Mutex<HashMap<ReplicaKey, u64>>>,
}

impl StackToggler {
    pub fn new(docker: DockerClient) -> Self {
        Self {
            docker,
            replicas: Arc::default(),
        }
    }

    fn replicas(&self) -> MutexGuard<'_, HashMap<ReplicaKey, u64>> {
        self.replicas.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replica count remembered for `service`, if it was scaled down by us.
    pub fn remembered_replicas(&self, context: &ContextKey, service: &str) -> Option<u64> {
        self.replicas()
            .get(&(context.clone(), service.to_string()))
            .copied()
    }

    #[instrument(skip(self), fields(context = %context))]
    pub async fn toggle(&self, context: &ContextKey, stack: &str) -> Result<ToggleOutcome> {
        let stack = stack.trim();
        if stack.is_empty() {
            return Err(Error::MissingInput("stack"));
        }

        let services = self.docker.list_services(context, stack).await;
        if services.is_empty() {
            self.toggle_compose(context, stack).await
        } else {
            self.toggle_swarm(context, services).await
        }
    }

    async fn toggle_compose(&self, context: &ContextKey, stack: &str) -> Result<ToggleOutcome> {
        let members = self.docker.project_containers(context, stack).await;
        if members.is_empty() {
            info!("No containers in stack");
            return Ok(ToggleOutcome::NotFound);
        }

        if members.iter().all(|c| c.state.is_running()) {
            for container in &members {
                if let Err(e) = self.docker.stop(context, &container.name).await {
                    warn!(container = %container.name, error = %e, "Failed stopping container");
                    continue;
                }
                if let Err(e) = self.docker.wait(context, &container.name).await {
                    warn!(container = %container.name, error = %e, "Failed waiting for container");
                }
            }
            info!(containers = members.len(), "Stopped stack");
            return Ok(ToggleOutcome::Stopped {
                containers: members.len(),
            });
        }

        let mut started = 0;
        for container in members.iter().filter(|c| !c.state.is_running()) {
            match self.docker.start(context, &container.name).await {
                Ok(()) => started += 1,
                Err(e) => warn!(container = %container.name, error = %e, "Failed starting container"),
            }
        }
        info!(started, "Started stack");
        Ok(ToggleOutcome::Started { containers: started })
    }

    async fn toggle_swarm(
        &self,
        context: &ContextKey,
        services: Vec<SwarmService>,
    ) -> Result<ToggleOutcome> {
        let (scalable, global): (Vec<_>, Vec<_>) =
            services.into_iter().partition(|s| !s.mode.is_global());
        for service in &global {
            warn!(service = %service.name, mode = %service.mode, "Skipping service that cannot be scaled");
        }

        let scale_down = scalable.iter().any(|s| s.has_running_replicas());
        let mut scaled = 0;

        for service in &scalable {
            let key = (context.clone(), service.name.clone());
            let target = if scale_down {
                // An already idle service keeps the count from its last scale down.
                let mut replicas = self.replicas();
                match service.desired.filter(|n| *n > 0) {
                    Some(desired) => {
                        replicas.insert(key, desired);
                    }
                    None => {
                        replicas.entry(key).or_insert(DEFAULT_REPLICAS);
                    }
                }
                0
            } else {
                self.replicas()
                    .get(&key)
                    .copied()
                    .unwrap_or(DEFAULT_REPLICAS)
            };

            match self.docker.scale_service(context, &service.name, target).await {
                Ok(()) => scaled += 1,
                Err(e) => warn!(service = %service.name, replicas = target, error = %e, "Failed scaling service"),
            }
        }

        if scale_down {
            info!(services = scaled, "Scaled stack down");
            Ok(ToggleOutcome::ScaledDown { services: scaled })
        } else {
            info!(services = scaled, "Scaled stack up");
            Ok(ToggleOutcome::ScaledUp { services: scaled })
        }
    }
}
