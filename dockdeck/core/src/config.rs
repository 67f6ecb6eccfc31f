use std::{path::PathBuf, time::Duration};

use thiserror::Error;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_PING_TTL: Duration = Duration::from_millis(5000);
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_CONTAINER_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_CONTEXT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_FIRST_POLL_DELAY: Duration = Duration::from_millis(10);

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Max concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Polling interval `{0}` must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("Command timeout must be greater than zero when set")]
    ZeroTimeout,
}

/// Tuning knobs shared by every component of the [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on docker processes running at once, across all contexts.
    pub max_concurrency: usize,
    /// How long a health probe result is reused.
    pub ping_ttl: Duration,
    pub health_interval: Duration,
    pub container_interval: Duration,
    pub context_interval: Duration,
    /// Delay before the out-of-band first fetch of a freshly created store.
    pub first_poll_delay: Duration,
    /// Kill docker invocations running longer than this. `None` waits forever.
    pub command_timeout: Option<Duration>,
    pub docker_binary: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            ping_ttl: DEFAULT_PING_TTL,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            container_interval: DEFAULT_CONTAINER_INTERVAL,
            context_interval: DEFAULT_CONTEXT_INTERVAL,
            first_poll_delay: DEFAULT_FIRST_POLL_DELAY,
            command_timeout: None,
            docker_binary: PathBuf::from("docker"),
        }
    }
}

impl Config {
    /// Create a new config with validation, keeping defaults for the polling cadence
    pub fn try_new(
        max_concurrency: usize,
        ping_ttl: Duration,
        command_timeout: Option<Duration>,
        docker_binary: PathBuf,
    ) -> Result<Self, ConfigError> {
        Self {
            max_concurrency,
            ping_ttl,
            command_timeout,
            docker_binary,
            ..Self::default()
        }
        .validate()
    }

    /// Check invariants after fields were set directly.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        for (name, interval) in [
            ("health_interval", self.health_interval),
            ("container_interval", self.container_interval),
            ("context_interval", self.context_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        match self.command_timeout {
            Some(timeout) if timeout.is_zero() => Err(ConfigError::ZeroTimeout),
            _ => Ok(self),
        }
    }
}
