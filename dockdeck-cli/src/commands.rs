use std::sync::Arc;

use anyhow::{bail, Context};
use dockdeck_core::{
    docker::{ContainerSnapshot, ContextEndpoint, StackSnapshot},
    stacks::aggregate,
    ContextKey, Engine, ToggleOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const WATCHER: &str = "dockdeck-watch";

/// Log every change the stores publish for `context` until `shutdown`.
pub async fn watch(
    engine: &Engine,
    context: ContextKey,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let key = context.clone();
    engine.health().subscribe(
        &context,
        WATCHER,
        Arc::new(move |up: &bool| info!(context = %key, up, "Docker health")),
    );

    let key = context.clone();
    engine.stacks().subscribe(
        &context,
        WATCHER,
        Arc::new(move |stacks: &Arc<StackSnapshot>| {
            for stack in stacks.values() {
                info!(
                    context = %key,
                    stack = %stack.name,
                    running = stack.running,
                    total = stack.total,
                    "Stack"
                );
            }
        }),
    );

    let key = context.clone();
    engine.containers().subscribe(
        &context,
        WATCHER,
        Arc::new(move |containers: &Arc<ContainerSnapshot>| {
            info!(context = %key, containers = containers.len(), "Container set changed");
        }),
    );

    info!(context = %context, "Watching, press Ctrl+C to stop");
    shutdown.cancelled().await;

    engine.containers().unsubscribe(&context, WATCHER);
    engine.stacks().unsubscribe(&context, WATCHER);
    engine.health().unsubscribe(&context, WATCHER);
    Ok(())
}

pub async fn ps(engine: &Engine, context: &ContextKey, all: bool) -> anyhow::Result<()> {
    let containers = engine
        .docker()
        .list_containers(context, all, &[])
        .await
        .context("failed listing containers")?;

    for container in containers {
        let stack = container.stack_name().unwrap_or("-");
        println!("{:<32} {:<12} {}", container.name, container.state.as_str(), stack);
    }
    Ok(())
}

pub async fn stacks(engine: &Engine, context: &ContextKey) -> anyhow::Result<()> {
    let docker = engine.docker();
    let containers: ContainerSnapshot = docker
        .list_containers(context, true, &[])
        .await
        .context("failed listing containers")?
        .into_iter()
        .map(|record| (record.name.clone(), record))
        .collect();
    let summary = aggregate(&containers);

    // Projects known to compose or swarm but without containers show 0/0.
    for name in docker.list_projects(context).await.unwrap_or_default() {
        let (running, total) = summary
            .get(&name)
            .map_or((0, 0), |stack| (stack.running, stack.total));
        println!("{name:<32} {running}/{total}");
    }
    Ok(())
}

pub async fn contexts(engine: &Engine) -> anyhow::Result<()> {
    let docker = engine.docker();
    for context in docker.list_contexts().await {
        let endpoint = match docker.inspect_context(&context.name).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(context = %context.name, error = %e, "Failed inspecting context");
                None
            }
        };
        println!("{}", context_line(&context.name, endpoint.as_ref()));
    }
    Ok(())
}

fn context_line(name: &str, endpoint: Option<&ContextEndpoint>) -> String {
    match endpoint {
        Some(endpoint) => {
            let tls = if endpoint.tls { "tls" } else { "plain" };
            format!("{name:<24} {}:{} ({tls})", endpoint.host, endpoint.port)
        }
        None => format!("{name:<24} local"),
    }
}

pub async fn toggle(engine: &Engine, context: &ContextKey, container: &str) -> anyhow::Result<()> {
    let docker = engine.docker();
    let Some(state) = docker.container_state(context, container).await else {
        bail!("container `{container}` not found in context {context}");
    };

    if state.is_running() {
        docker.stop(context, container).await?;
        docker.wait(context, container).await?;
        println!("{container} stopped");
    } else {
        docker.start(context, container).await?;
        println!("{container} started");
    }
    Ok(())
}

pub async fn toggle_stack(engine: &Engine, context: &ContextKey, stack: &str) -> anyhow::Result<()> {
    match engine.toggler().toggle(context, stack).await? {
        ToggleOutcome::NotFound => bail!("stack `{stack}` not found in context {context}"),
        outcome => println!("{stack}: {outcome}"),
    }
    Ok(())
}
