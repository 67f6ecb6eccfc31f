//! Typed docker operations on top of the [`Scheduler`].
//!
//! Each method builds the argument list for one CLI invocation, submits it
//! at the priority the operation deserves and parses the output.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::{
    context::ContextKey,
    error::Result,
    scheduler::{Priority, Scheduler},
};

pub mod parse;
pub mod types;

pub use types::*;

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Typed front of the docker CLI; every call is queued on the [`Scheduler`].
#[derive(Debug, Clone)]
pub struct DockerClient {
    scheduler: Scheduler,
}

impl DockerClient {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// `docker version`, uncached. See [`PingCache`](crate::cache::PingCache)
    /// for the cached variant.
    pub async fn ping(&self, context: &ContextKey) -> bool {
        self.scheduler
            .run(context, Priority::Normal, args(["version"]))
            .await
            .is_ok()
    }

    /// `docker ps [-a] [--filter f]…` parsed into records.
    pub async fn list_containers(
        &self,
        context: &ContextKey,
        all: bool,
        filters: &[String],
    ) -> Result<Vec<ContainerRecord>> {
        let mut cmd = args(["ps"]);
        if all {
            cmd.push("-a".into());
        }
        for filter in filters {
            cmd.push("--filter".into());
            cmd.push(filter.clone());
        }
        cmd.push("--format".into());
        cmd.push(parse::PS_FORMAT.into());

        let out = self.scheduler.run(context, Priority::High, cmd).await?;
        Ok(parse::parse_ps(&out))
    }

    /// Current state of one container, `None` if it does not exist or the
    /// daemon could not be asked.
    pub async fn container_state(&self, context: &ContextKey, name: &str) -> Option<ContainerState> {
        match self
            .scheduler
            .run(
                context,
                Priority::Normal,
                args(["inspect", "-f", "{{.State.Status}}", name]),
            )
            .await
        {
            Ok(out) if !out.trim().is_empty() => Some(ContainerState::from(out.trim())),
            Ok(_) => None,
            Err(e) => {
                debug!(context = %context, container = %name, error = %e, "Inspect failed");
                None
            }
        }
    }

    pub async fn start(&self, context: &ContextKey, name: &str) -> Result<()> {
        self.scheduler
            .run(context, Priority::Urgent, args(["start", name]))
            .await
            .map(drop)
    }

    pub async fn stop(&self, context: &ContextKey, name: &str) -> Result<()> {
        self.scheduler
            .run(context, Priority::Urgent, args(["stop", name]))
            .await
            .map(drop)
    }

    pub async fn wait(&self, context: &ContextKey, name: &str) -> Result<()> {
        self.scheduler
            .run(context, Priority::Normal, args(["wait", name]))
            .await
            .map(drop)
    }

    pub async fn remove(&self, context: &ContextKey, name: &str) -> Result<()> {
        self.scheduler
            .run(context, Priority::Normal, args(["rm", "-f", name]))
            .await
            .map(drop)
    }

    pub async fn run_detached(&self, context: &ContextKey, image: &str, name: &str) -> Result<()> {
        self.scheduler
            .run(
                context,
                Priority::Normal,
                args(["run", "-d", "--name", name, image]),
            )
            .await
            .map(drop)
    }

    pub async fn list_images(&self, context: &ContextKey) -> Result<Vec<String>> {
        let out = self
            .scheduler
            .run(
                context,
                Priority::Normal,
                args(["images", "--format", parse::IMAGE_FORMAT]),
            )
            .await?;
        Ok(parse::parse_images(&out))
    }

    /// Every compose project and swarm stack the context knows about,
    /// sorted and deduplicated.
    ///
    /// Combines container labels with `docker compose ls` and
    /// `docker stack ls`; the latter two fail on engines without compose or
    /// swarm and are then ignored.
    #[instrument(skip(self), fields(context = %context))]
    pub async fn list_projects(&self, context: &ContextKey) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self
            .list_containers(context, true, &[])
            .await?
            .iter()
            .filter_map(|c| c.stack_name().map(str::to_string))
            .collect();

        match self
            .scheduler
            .run(
                context,
                Priority::High,
                args(["compose", "ls", "-a", "--format", "json"]),
            )
            .await
            .and_then(|out| parse::parse_compose_ls(&out))
        {
            Ok(projects) => names.extend(projects),
            Err(e) => debug!(error = %e, "compose ls unavailable"),
        }

        match self
            .scheduler
            .run(
                context,
                Priority::High,
                args(["stack", "ls", "-a", "--format", parse::NAME_FORMAT]),
            )
            .await
        {
            Ok(out) => names.extend(parse::parse_names(&out)),
            Err(e) => debug!(error = %e, "stack ls unavailable"),
        }

        Ok(names.into_iter().collect())
    }

    /// Containers of `project`, matched by compose project or stack
    /// namespace label and merged by name.
    pub async fn project_containers(
        &self,
        context: &ContextKey,
        project: &str,
    ) -> Vec<ContainerRecord> {
        let mut merged = BTreeMap::new();
        for label in [COMPOSE_PROJECT_LABEL, STACK_NAMESPACE_LABEL] {
            let filter = format!("label={label}={project}");
            match self.list_containers(context, true, &[filter]).await {
                Ok(records) => {
                    merged.extend(records.into_iter().map(|r| (r.name.clone(), r)));
                }
                Err(e) => debug!(context = %context, %project, error = %e, "Filtered ps failed"),
            }
        }
        merged.into_values().collect()
    }

    /// Swarm services carrying the stack namespace label; empty when swarm
    /// is not enabled or the command fails.
    pub async fn list_services(&self, context: &ContextKey, stack: &str) -> Vec<SwarmService> {
        let filter = format!("label={STACK_NAMESPACE_LABEL}={stack}");
        match self
            .scheduler
            .run(
                context,
                Priority::Normal,
                args([
                    "service",
                    "ls",
                    "--filter",
                    &filter,
                    "--format",
                    parse::SERVICE_FORMAT,
                ]),
            )
            .await
        {
            Ok(out) => parse::parse_service_ls(&out),
            Err(e) => {
                debug!(context = %context, %stack, error = %e, "service ls failed");
                Vec::new()
            }
        }
    }

    pub async fn scale_service(&self, context: &ContextKey, service: &str, replicas: u64) -> Result<()> {
        let target = format!("{service}={replicas}");
        self.scheduler
            .run(context, Priority::Normal, args(["service", "scale", &target]))
            .await
            .map(drop)
    }

    /// Names from `docker context ls`; empty on failure.
    pub async fn list_contexts(&self) -> Vec<ContextRecord> {
        match self
            .scheduler
            .run(
                &ContextKey::Default,
                Priority::High,
                args(["context", "ls", "--format", parse::NAME_FORMAT]),
            )
            .await
        {
            Ok(out) => parse::parse_names(&out)
                .into_iter()
                .map(ContextRecord::new)
                .collect(),
            Err(e) => {
                debug!(error = %e, "context ls failed");
                Vec::new()
            }
        }
    }

    /// Remote endpoint of a named context, `None` for local sockets.
    pub async fn inspect_context(&self, name: &str) -> Result<Option<ContextEndpoint>> {
        let out = self
            .scheduler
            .run(
                &ContextKey::Default,
                Priority::Normal,
                args(["context", "inspect", name]),
            )
            .await?;
        parse::parse_context_inspect(&out)
    }
}
