//! # dockdeck
//!
//! Binary front end of the dockdeck plugin core.
//!
//! - `dockdeck bridge` speaks the JSON-lines host protocol on stdin/stdout
//!   and is what the control surface host launches.
//! - `watch`, `ps`, `stacks`, `contexts`, `toggle` and `toggle-stack` drive
//!   the same engine from a terminal, which is handy when a key does not
//!   show what you expect.
//!
//! Logs always go to stderr so stdout stays reserved for protocol output.

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dockdeck_core::{Config, ContextKey, Engine};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod bridge;
mod commands;

/// Docker control surface plugin core
#[derive(Debug, Parser)]
#[command(name = "dockdeck", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Upper bound on docker processes running at once
    #[arg(long, env = "DOCKER_CLI_MAX_CONCURRENCY", default_value_t = 5, global = true)]
    max_concurrency: usize,

    /// How long a health probe result is reused, in milliseconds
    #[arg(long, env = "DOCKER_PING_TTL_MS", default_value_t = 5000, global = true)]
    ping_ttl_ms: u64,

    /// Kill docker invocations running longer than this many milliseconds
    #[arg(long, env = "DOCKER_CLI_TIMEOUT_MS", global = true)]
    command_timeout_ms: Option<u64>,

    /// Docker binary to spawn
    #[arg(long, env = "DOCKDECK_DOCKER_BIN", default_value = "docker", global = true)]
    docker_bin: PathBuf,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, env = "DOCKDECK_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log line format written to stderr
    #[arg(long, env = "DOCKDECK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the host bridge: events on stdin, render commands on stdout
    Bridge,

    /// Log health, stack and container changes until Ctrl+C
    Watch {
        /// Docker context to watch (default: the local context)
        #[arg(short, long)]
        context: Option<String>,
    },

    /// List containers
    Ps {
        #[arg(short, long)]
        context: Option<String>,

        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },

    /// List compose projects and swarm stacks with running counts
    Stacks {
        #[arg(short, long)]
        context: Option<String>,
    },

    /// List docker contexts
    Contexts,

    /// Start a stopped container or stop a running one
    Toggle {
        container: String,

        #[arg(short, long)]
        context: Option<String>,
    },

    /// Bring a compose project or swarm stack up or down as a whole
    ToggleStack {
        stack: String,

        #[arg(short, long)]
        context: Option<String>,
    },
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        Config::try_new(
            self.max_concurrency,
            Duration::from_millis(self.ping_ttl_ms),
            self.command_timeout_ms.map(Duration::from_millis),
            self.docker_bin.clone(),
        )
        .context("invalid configuration")
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let level = Level::from_str(level.to_lowercase().as_str()).unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = cli.config()?;
    info!(
        version = %env!("CARGO_PKG_VERSION"),
        max_concurrency = config.max_concurrency,
        command_timeout = ?config.command_timeout,
        docker = %config.docker_binary.display(),
        "Starting dockdeck"
    );
    let engine = Engine::new(config);

    let shutdown = CancellationToken::new();
    tokio::spawn(handle_shutdown_signals(shutdown.clone()));

    let context = |name: &Option<String>| ContextKey::from_setting(name.as_deref());
    let result = match &cli.command {
        Command::Bridge => {
            bridge::run(
                engine.clone(),
                tokio::io::stdin(),
                tokio::io::stdout(),
                shutdown,
            )
            .await
        }
        Command::Watch { context: name } => {
            commands::watch(&engine, context(name), shutdown).await
        }
        Command::Ps { context: name, all } => commands::ps(&engine, &context(name), *all).await,
        Command::Stacks { context: name } => commands::stacks(&engine, &context(name)).await,
        Command::Contexts => commands::contexts(&engine).await,
        Command::Toggle {
            container,
            context: name,
        } => commands::toggle(&engine, &context(name), container).await,
        Command::ToggleStack {
            stack,
            context: name,
        } => commands::toggle_stack(&engine, &context(name), stack).await,
    };

    engine.shutdown();
    result
}

/// Cancel `shutdown_token` on Ctrl+C or SIGTERM
async fn handle_shutdown_signals(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    shutdown_token.cancel();
}
