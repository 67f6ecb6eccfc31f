#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use dockdeck_actions::{Dispatcher, HostCommand, HostEvent};
use dockdeck_core::{CommandRunner, Config, ContextKey, Engine, Error, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Debug, Clone)]
struct Container {
    state: String,
    labels: BTreeMap<String, String>,
}

/// In-memory daemon answering the subset of the docker CLI the controllers
/// use. Every invocation is recorded as `<context> <args...>`.
#[derive(Default)]
pub struct FakeDocker {
    containers: Mutex<BTreeMap<String, Container>>,
    down: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeDocker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(self: Arc<Self>, name: &str, state: &str) -> Arc<Self> {
        self.with_labels(name, state, &[])
    }

    pub fn with_labels(self: Arc<Self>, name: &str, state: &str, labels: &[(&str, &str)]) -> Arc<Self> {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            Container {
                state: state.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn state(&self, name: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.state.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn set_state(&self, name: &str, state: &str) -> Result<String> {
        match self.containers.lock().unwrap().get_mut(name) {
            Some(container) => {
                container.state = state.to_string();
                Ok(name.to_string())
            }
            None => Err(no_such(name)),
        }
    }

    fn ps(&self, args: &[String]) -> String {
        let filter = args
            .iter()
            .position(|a| a == "--filter")
            .and_then(|i| args.get(i + 1))
            .and_then(|f| f.strip_prefix("label="))
            .and_then(|f| f.split_once('='));

        self.containers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| match filter {
                Some((key, value)) => c.labels.get(key).is_some_and(|v| v == value),
                None => true,
            })
            .map(|(name, c)| {
                format!(
                    "{name}\t{}\t{}",
                    c.state,
                    serde_json::to_string(&c.labels).unwrap()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn answer(&self, args: &[String]) -> Result<String> {
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["version", ..] => Ok("Client: 27.0.3\nServer: 27.0.3".into()),
            ["ps", ..] => Ok(self.ps(args)),
            ["inspect", "-f", _, name] => self
                .state(name)
                .ok_or_else(|| no_such(name)),
            ["start", name] => self.set_state(name, "running"),
            ["stop", name] => self.set_state(name, "exited"),
            ["wait", _] => Ok("0".into()),
            ["rm", "-f", name] => match self.containers.lock().unwrap().remove(*name) {
                Some(_) => Ok(name.to_string()),
                None => Err(no_such(name)),
            },
            ["run", "-d", "--name", name, _image] => {
                self.containers.lock().unwrap().insert(
                    name.to_string(),
                    Container {
                        state: "running".into(),
                        labels: BTreeMap::new(),
                    },
                );
                Ok("3f2a9c".into())
            }
            ["images", ..] => Ok("nginx:latest\n<none>:<none>\nredis:7".into()),
            ["compose", "ls", ..] => Ok("[]".into()),
            ["stack", "ls", ..] => Ok(String::new()),
            ["service", "ls", ..] => Ok(String::new()),
            ["context", "ls", ..] => Ok("default\nprod".into()),
            _ => Err(failure(args)),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeDocker {
    async fn execute(&self, args: Vec<String>, context: &ContextKey) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{context} {}", args.join(" ")));
        if self.down.load(Ordering::SeqCst) {
            return Err(failure(&args));
        }
        self.answer(&args)
    }
}

fn no_such(name: &str) -> Error {
    Error::CommandFailed {
        args: format!("inspect {name}"),
        exit_code: Some(1),
        stderr: format!("Error: No such object: {name}"),
    }
}

pub fn failure(args: &[String]) -> Error {
    Error::CommandFailed {
        args: args.join(" "),
        exit_code: Some(1),
        stderr: "Cannot connect to the Docker daemon".into(),
    }
}

/// Engine over `docker` with an uncached health probe.
pub fn engine(docker: Arc<FakeDocker>) -> Engine {
    let config = Config {
        ping_ttl: Duration::ZERO,
        ..Config::default()
    };
    Engine::with_runner(config, docker)
}

/// Dispatcher writing host commands to the returned receiver.
pub fn dispatcher(docker: Arc<FakeDocker>) -> (Dispatcher, UnboundedReceiver<HostCommand>) {
    let (tx, rx) = unbounded_channel();
    (Dispatcher::with_channel(engine(docker), tx), rx)
}

pub fn event(json: &str) -> HostEvent {
    serde_json::from_str(json).unwrap()
}

/// Let the first poll of every store complete.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn drain(rx: &mut UnboundedReceiver<HostCommand>) -> Vec<HostCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    commands
}

pub fn last_title(commands: &[HostCommand]) -> Option<String> {
    commands.iter().rev().find_map(|c| match c {
        HostCommand::SetTitle { title, .. } => Some(title.clone()),
        _ => None,
    })
}

pub fn last_state(commands: &[HostCommand]) -> Option<u8> {
    commands.iter().rev().find_map(|c| match c {
        HostCommand::SetState { state, .. } => Some(*state),
        _ => None,
    })
}

pub fn last_feedback(commands: &[HostCommand]) -> Option<(String, Option<String>)> {
    commands.iter().rev().find_map(|c| match c {
        HostCommand::SetFeedback { icon, title, .. } => Some((icon.clone(), title.clone())),
        _ => None,
    })
}
