#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use dockdeck_core::{CommandRunner, Config, ContextKey, Engine, Error, Result};

type Handler = dyn Fn(&[String], &ContextKey) -> Result<String> + Send + Sync;

/// Runner answering from a closure instead of spawning docker.
///
/// Records every invocation and how many ran at the same time.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<(ContextKey, Vec<String>)>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(
        handler: impl Fn(&[String], &ContextKey) -> Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::slow(Duration::ZERO, handler)
    }

    /// Every command takes `delay` (tokio time) before answering.
    pub fn slow(
        delay: Duration,
        handler: impl Fn(&[String], &ContextKey) -> Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            calls: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.join(" "))
            .collect()
    }

    /// Number of invocations whose command line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, args: Vec<String>, context: &ContextKey) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((context.clone(), args.clone()));

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.handler)(&args, context);
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn failure(args: &[String]) -> Error {
    Error::CommandFailed {
        args: args.join(" "),
        exit_code: Some(1),
        stderr: "Cannot connect to the Docker daemon".into(),
    }
}

/// Config with an uncached health probe so every tick hits the runner.
pub fn test_config() -> Config {
    Config {
        ping_ttl: Duration::ZERO,
        ..Config::default()
    }
}

pub fn engine(runner: Arc<ScriptedRunner>) -> Engine {
    Engine::with_runner(test_config(), runner)
}

/// Collects every value a subscriber callback receives.
#[derive(Clone)]
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Recorder<T> {
    pub fn callback(&self) -> Arc<dyn Fn(&T) + Send + Sync> {
        let seen = self.seen.clone();
        Arc::new(move |value: &T| seen.lock().unwrap().push(value.clone()))
    }

    pub fn values(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// `docker ps` output line in the format the store requests.
pub fn ps_line(name: &str, state: &str, labels: &[(&str, &str)]) -> String {
    let labels: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    format!("{name}\t{state}\t{}", serde_json::Value::Object(labels))
}
