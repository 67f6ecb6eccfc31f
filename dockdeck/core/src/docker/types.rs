use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Label docker compose v2 sets on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label `docker stack deploy` sets on services and their tasks.
pub const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";
/// Label swarm sets on task containers naming the owning service.
pub const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";

/// Lifecycle state reported by `docker ps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerState {
    Running,
    Exited,
    Created,
    Paused,
    Restarting,
    Removing,
    Dead,
    /// Anything docker reports that this crate does not know about.
    Other(String),
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Created => "created",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Dead => "dead",
            ContainerState::Other(raw) => raw,
        }
    }
}

impl From<&str> for ContainerState {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "created" => ContainerState::Created,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "dead" => ContainerState::Dead,
            other => ContainerState::Other(other.to_string()),
        }
    }
}

impl From<String> for ContainerState {
    fn from(value: String) -> Self {
        ContainerState::from(value.as_str())
    }
}

impl From<ContainerState> for String {
    fn from(value: ContainerState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container as seen by a single `docker ps` poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct ContainerRecord {
    pub name: String,
    pub state: ContainerState,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ContainerRecord {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Compose project, falling back to the swarm stack namespace.
    pub fn stack_name(&self) -> Option<&str> {
        self.label(COMPOSE_PROJECT_LABEL)
            .or_else(|| self.label(STACK_NAMESPACE_LABEL))
            .filter(|name| !name.is_empty())
    }

    /// Owning swarm service for task containers.
    pub fn swarm_service(&self) -> Option<&str> {
        self.label(SWARM_SERVICE_LABEL).filter(|name| !name.is_empty())
    }
}

/// Every container of a context, keyed by name.
pub type ContainerSnapshot = BTreeMap<String, ContainerRecord>;

/// Running/total member counts of one compose project or swarm stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct StackRecord {
    pub name: String,
    pub running: usize,
    pub total: usize,
}

impl StackRecord {
    pub fn all_running(&self) -> bool {
        self.total > 0 && self.running == self.total
    }
}

/// Stacks of a context, keyed by name.
pub type StackSnapshot = BTreeMap<String, StackRecord>;

/// A configured docker context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_new::new)]
pub struct ContextRecord {
    pub name: String,
}

/// Configured contexts keyed by name.
pub type ContextSnapshot = BTreeMap<String, ContextRecord>;

/// Remote endpoint a context points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEndpoint {
    /// `scheme://hostname`, e.g. `https://10.0.0.4`.
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Swarm scheduling mode of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceMode {
    Replicated,
    Global,
    ReplicatedJob,
    GlobalJob,
    Other(String),
}

impl ServiceMode {
    /// Global services run one task per node and cannot be scaled.
    pub fn is_global(&self) -> bool {
        matches!(self, ServiceMode::Global | ServiceMode::GlobalJob)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServiceMode::Replicated => "replicated",
            ServiceMode::Global => "global",
            ServiceMode::ReplicatedJob => "replicated-job",
            ServiceMode::GlobalJob => "global-job",
            ServiceMode::Other(raw) => raw,
        }
    }
}

impl From<&str> for ServiceMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "replicated" => ServiceMode::Replicated,
            "global" => ServiceMode::Global,
            "replicated-job" => ServiceMode::ReplicatedJob,
            "global-job" => ServiceMode::GlobalJob,
            other => ServiceMode::Other(other.to_string()),
        }
    }
}

impl From<String> for ServiceMode {
    fn from(value: String) -> Self {
        ServiceMode::from(value.as_str())
    }
}

impl From<ServiceMode> for String {
    fn from(value: ServiceMode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of `docker service ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmService {
    pub name: String,
    pub mode: ServiceMode,
    /// Tasks currently running, the left side of `running/desired`.
    pub running: Option<u64>,
    /// Desired replica count, the right side of `running/desired`.
    pub desired: Option<u64>,
}

impl SwarmService {
    pub fn has_running_replicas(&self) -> bool {
        self.running.is_some_and(|n| n > 0)
    }
}
