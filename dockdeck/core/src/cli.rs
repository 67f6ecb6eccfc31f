//! Runs one docker invocation and hands back its stdout.
//!
//! Nothing here retries, caches or orders commands; that lives in the
//! [`Scheduler`](crate::scheduler::Scheduler) and the
//! [`PingCache`](crate::cache::PingCache) layered on top.

use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{
    context::ContextKey,
    error::{Error, Result},
};

/// Executes a docker command line against a context.
///
/// The production implementation is [`DockerCli`]; tests swap in scripted
/// runners so the scheduling and polling logic can be exercised without a
/// daemon.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `docker [--context <ctx>] <args…>` and return stdout as text.
    async fn execute(&self, args: Vec<String>, context: &ContextKey) -> Result<String>;
}

/// Spawns the docker binary as a child process.
#[derive(Debug, Clone, derive_new::new)]
pub struct DockerCli {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(PathBuf::from("docker"), None)
    }
}

impl DockerCli {
    fn full_args(args: Vec<String>, context: &ContextKey) -> Vec<String> {
        let mut full = context.cli_args();
        full.extend(args);
        full
    }
}

#[async_trait]
impl CommandRunner for DockerCli {
    async fn execute(&self, args: Vec<String>, context: &ContextKey) -> Result<String> {
        let args = Self::full_args(args, context);
        let joined = args.join(" ");
        trace!(command = %joined, "Spawning docker");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.binary.display().to_string(),
                source,
            })?;

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| Error::Timeout {
                    args: joined.clone(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| Error::Spawn {
            program: self.binary.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(command = %joined, status = %output.status, "docker exited unsuccessfully");
            return Err(Error::CommandFailed {
                args: joined,
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
