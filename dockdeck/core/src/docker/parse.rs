//! Parsers for the docker CLI output formats this crate requests.
//!
//! Malformed lines are dropped rather than failing the whole batch.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::types::{ContainerRecord, ContainerState, ContextEndpoint, ServiceMode, SwarmService};
use crate::error::{Error, Result};

/// `--format` template for `docker ps`.
pub const PS_FORMAT: &str = "{{.Names}}\t{{.State}}\t{{json .Labels}}";
/// `--format` template for `docker service ls`.
pub const SERVICE_FORMAT: &str = "{{.Name}}\t{{.Mode}}\t{{.Replicas}}";
pub const IMAGE_FORMAT: &str = "{{.Repository}}:{{.Tag}}";
pub const NAME_FORMAT: &str = "{{.Name}}";

const UNTAGGED_IMAGE: &str = "<none>:<none>";

fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
}

/// Parse one `docker ps` line formatted with [`PS_FORMAT`].
pub fn parse_ps_line(line: &str) -> Option<ContainerRecord> {
    let mut fields = line.splitn(3, '\t');
    let name = fields.next()?.trim();
    let state = fields.next()?.trim();
    if name.is_empty() || state.is_empty() {
        return None;
    }

    let labels = fields
        .next()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| match serde_json::from_str::<Option<BTreeMap<String, String>>>(raw) {
            Ok(labels) => labels,
            Err(e) => {
                debug!(container = %name, error = %e, "Ignoring unparseable labels");
                None
            }
        })
        .unwrap_or_default();

    Some(ContainerRecord {
        name: name.to_string(),
        state: ContainerState::from(state),
        labels,
    })
}

pub fn parse_ps(output: &str) -> Vec<ContainerRecord> {
    lines(output).filter_map(parse_ps_line).collect()
}

/// `repo:tag` lines, without dangling images.
pub fn parse_images(output: &str) -> Vec<String> {
    lines(output)
        .map(str::trim)
        .filter(|image| *image != UNTAGGED_IMAGE)
        .map(str::to_string)
        .collect()
}

/// One trimmed name per non-empty line.
pub fn parse_names(output: &str) -> Vec<String> {
    lines(output).map(|l| l.trim().to_string()).collect()
}

#[derive(Deserialize)]
struct ComposeProject {
    #[serde(rename = "Name")]
    name: String,
}

/// Project names from `docker compose ls -a --format json`.
pub fn parse_compose_ls(output: &str) -> Result<Vec<String>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let projects: Vec<ComposeProject> =
        serde_json::from_str(trimmed).map_err(|e| Error::parse("compose ls output", e))?;
    Ok(projects.into_iter().map(|p| p.name).collect())
}

/// Split a `running/desired` replica column. Either side may be missing or
/// non-numeric; global services also report e.g. `1/1`.
pub fn parse_replicas(raw: &str) -> (Option<u64>, Option<u64>) {
    // Newer engines append details such as "(max 1 per node)".
    let raw = raw.split_whitespace().next().unwrap_or_default();
    match raw.split_once('/') {
        Some((running, desired)) => (running.trim().parse().ok(), desired.trim().parse().ok()),
        None => (raw.trim().parse().ok(), None),
    }
}

pub fn parse_service_line(line: &str) -> Option<SwarmService> {
    let mut fields = line.split('\t');
    let name = fields.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let mode = ServiceMode::from(fields.next().unwrap_or_default());
    let (running, desired) = parse_replicas(fields.next().unwrap_or_default());

    Some(SwarmService {
        name: name.to_string(),
        mode,
        running,
        desired,
    })
}

pub fn parse_service_ls(output: &str) -> Vec<SwarmService> {
    lines(output).filter_map(parse_service_line).collect()
}

#[derive(Deserialize)]
struct InspectedContext {
    #[serde(rename = "Endpoints", default)]
    endpoints: BTreeMap<String, InspectedEndpoint>,
}

#[derive(Deserialize)]
struct InspectedEndpoint {
    #[serde(rename = "Host")]
    host: Option<String>,
}

/// Resolve the docker endpoint of `docker context inspect <name>` output.
///
/// Returns `None` for local socket or named pipe endpoints, which are served
/// by the default client.
pub fn parse_context_inspect(output: &str) -> Result<Option<ContextEndpoint>> {
    let value: serde_json::Value =
        serde_json::from_str(output.trim()).map_err(|e| Error::parse("context inspect output", e))?;
    // The CLI prints an array even for a single context.
    let first = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        serde_json::Value::Array(_) => return Ok(None),
        other => other,
    };
    let context: InspectedContext =
        serde_json::from_value(first).map_err(|e| Error::parse("context inspect output", e))?;

    let Some(host) = context
        .endpoints
        .get("docker")
        .and_then(|endpoint| endpoint.host.as_deref())
        .filter(|host| !host.is_empty())
    else {
        return Ok(None);
    };

    if host.starts_with("unix://") || host.starts_with("npipe://") {
        return Ok(None);
    }

    // TCP contexts default to TLS.
    let normalized = match host.strip_prefix("tcp://") {
        Some(rest) => format!("https://{rest}"),
        None => host.to_string(),
    };
    let url = Url::parse(&normalized).map_err(|e| Error::parse("context endpoint", e))?;
    let hostname = url
        .host_str()
        .ok_or_else(|| Error::parse("context endpoint", format!("`{host}` has no host")))?;
    let tls = url.scheme() == "https";
    let port = url.port().unwrap_or(if tls { 2376 } else { 2375 });

    Ok(Some(ContextEndpoint {
        host: format!("{}://{}", url.scheme(), hostname),
        port,
        tls,
    }))
}
