//! Polling, coalescing and scheduling core for driving docker from a
//! button/dial control surface.
//!
//! Many independently configured UI elements watch the same docker
//! contexts. This crate keeps one poll per context and store, detects
//! changes before fanning them out, and funnels every docker invocation
//! through a [`Scheduler`] with a global concurrency cap and per-context
//! priority queues.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dockdeck_core::{Config, ContextKey, Engine};
//!
//! # async fn demo() {
//! let engine = Engine::new(Config::default());
//! engine.health().subscribe(&ContextKey::Default, "cli", Arc::new(|up: &bool| {
//!     println!("docker up: {up}");
//! }));
//! # }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod cache;
pub mod cli;
pub mod config;
pub mod containers;
pub mod context;
pub mod contexts;
pub mod docker;
pub mod error;
pub mod health;
pub mod scheduler;
pub mod stacks;
pub mod subscribers;
pub mod toggle;

mod poll;

pub use cache::PingCache;
pub use cli::{CommandRunner, DockerCli};
pub use config::{Config, ConfigError};
pub use containers::ContainerStore;
pub use context::ContextKey;
pub use contexts::ContextStore;
pub use docker::DockerClient;
pub use error::{Error, Result};
pub use health::HealthMonitor;
pub use poll::PollOutcome;
pub use scheduler::{Priority, Scheduler};
pub use stacks::StackAggregator;
pub use subscribers::Callback;
pub use toggle::{StackToggler, ToggleOutcome};

/// Registry owning one instance of every component, wired to one scheduler.
///
/// Cheap to clone; clones share all state. Polling loops spawned by the
/// stores run until their last subscriber leaves or [`Engine::shutdown`]
/// is called.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<Config>,
    docker: DockerClient,
    ping_cache: Arc<PingCache>,
    health: HealthMonitor,
    containers: ContainerStore,
    stacks: StackAggregator,
    contexts: ContextStore,
    toggler: StackToggler,
    shutdown: CancellationToken,
}

impl Engine {
    /// Engine spawning the docker binary named in `config`.
    pub fn new(config: Config) -> Self {
        let runner = DockerCli::new(config.docker_binary.clone(), config.command_timeout);
        Self::with_runner(config, Arc::new(runner))
    }

    /// Engine executing commands through `runner`.
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(config.max_concurrency, runner);
        let docker = DockerClient::new(scheduler.clone());
        let ping_cache = Arc::new(PingCache::new(scheduler, config.ping_ttl));
        let health = HealthMonitor::new(
            ping_cache.clone(),
            config.health_interval,
            shutdown.child_token(),
        );
        let containers = ContainerStore::new(
            docker.clone(),
            config.container_interval,
            config.first_poll_delay,
            shutdown.child_token(),
        );
        let stacks = StackAggregator::new(containers.clone());
        let contexts = ContextStore::new(
            docker.clone(),
            config.context_interval,
            config.first_poll_delay,
            shutdown.child_token(),
        );
        let toggler = StackToggler::new(docker.clone());

        info!(
            max_concurrency = config.max_concurrency,
            ping_ttl_ms = config.ping_ttl.as_millis() as u64,
            "Engine ready"
        );

        Self {
            config: Arc::new(config),
            docker,
            ping_cache,
            health,
            containers,
            stacks,
            contexts,
            toggler,
            shutdown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.docker.scheduler()
    }

    pub fn docker(&self) -> &DockerClient {
        &self.docker
    }

    pub fn ping_cache(&self) -> &PingCache {
        &self.ping_cache
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn containers(&self) -> &ContainerStore {
        &self.containers
    }

    pub fn stacks(&self) -> &StackAggregator {
        &self.stacks
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn toggler(&self) -> &StackToggler {
        &self.toggler
    }

    /// Stop every polling loop. Subscriptions stay registered but no longer
    /// receive updates.
    pub fn shutdown(&self) {
        info!("Shutting down polling");
        self.shutdown.cancel();
    }
}
