//! reconstream - worker server and pipeline tooling
//!
//! `serve` runs a worker that accepts distributed sessions; `check` builds a
//! stream config against the built-in plugins without running it.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reconstream::{Context, Loader, ServerConfig, Stream, StreamConfig, WorkerServer};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "reconstream", version, about = "Streaming reconstruction pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a worker server
    Serve {
        /// Server config (TOML)
        #[arg(long, short, env = "RECONSTREAM_CONFIG")]
        config: Option<PathBuf>,

        /// Override the listening port
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Build a stream config without running it
    Check {
        /// Stream config (TOML)
        #[arg(long, short)]
        stream: PathBuf,

        /// Server config providing the worker list
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

fn load_server_config(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading server config {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

/// Console logging, plus a daily rolling file when a log directory is set.
fn init_logging(config: &ServerConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender =
                tracing_appender::rolling::daily(directory, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, port } => {
            let mut config = load_server_config(config.as_ref())?;
            if let Some(port) = port {
                config.port = port;
            }
            let _guard = init_logging(&config);

            tracing::info!(
                port = config.port,
                workers = config.distribution.workers.len(),
                "Starting reconstream worker"
            );
            let loader = Loader::new(config.distribution.clone());
            if let Some(stream) = &config.stream {
                Stream::new(stream, &Context::default(), &loader)
                    .context("default stream config is invalid")?;
            }
            let server = WorkerServer::bind(("0.0.0.0", config.port), loader)
                .with_context(|| format!("binding port {}", config.port))?;
            server.serve()?;
        }
        Command::Check { stream, config } => {
            let server_config = load_server_config(config.as_ref())?;
            let _guard = init_logging(&server_config);

            let stream_config = StreamConfig::load(&stream)
                .with_context(|| format!("loading stream config {}", stream.display()))?;
            let loader = Loader::new(server_config.distribution);
            let built = Stream::new(&stream_config, &Context::default(), &loader)
                .context("building stream")?;
            println!(
                "Stream {:?} is valid: {}",
                built.key(),
                built.stage_names().join(" -> ")
            );
        }
    }
    Ok(())
}
