//! Feature flag evaluation daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     flag-service                     │
//!                 │                                                      │
//!   RPC client    │  ┌──────────┐   ┌──────────┐   ┌─────────────────┐   │
//!  ───────────────┼─▶│   net    │──▶│   http   │──▶│     service     │   │
//!  (h1/h2c/TLS)   │  │ listener │   │  layers  │   │ resolve / all / │   │
//!                 │  └──────────┘   └──────────┘   │  event stream   │   │
//!                 │                                └───────┬─────────┘   │
//!                 │                                        │             │
//!                 │   ┌───────────┐   reload   ┌───────────▼─────────┐   │
//!  flag file ─────┼──▶│  watcher  │───────────▶│ store (Evaluator)   │   │
//!                 │   └─────┬─────┘            └─────────────────────┘   │
//!                 │         │ configuration_change                       │
//!                 │         ▼                                            │
//!                 │   ┌───────────┐  mailboxes  ┌──────────────────┐     │
//!                 │   │ eventing  │────────────▶│  stream tasks    │     │
//!                 │   │    bus    │             │  (keep-alive)    │     │
//!                 │   └───────────┘             └──────────────────┘     │
//!                 │                                                      │
//!   probes ───────┼─▶ admin: /healthz /readyz /metrics (management port)  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use flag_service::admin::ReadinessProbe;
use flag_service::config::{load_config, validate_config, ConfigError, ServiceConfig};
use flag_service::eval::Evaluator;
use flag_service::lifecycle::{wait_for_signal, Shutdown};
use flag_service::observability::logging;
use flag_service::store::watcher::{apply_updates, FlagWatcher};
use flag_service::store::{FlagDocument, FlagStore};
use flag_service::FlagService;

#[derive(Parser)]
#[command(name = "flag-service", version)]
#[command(about = "Feature flag evaluation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service
    Start(StartArgs),
}

#[derive(Args)]
struct StartArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON flag definition file
    #[arg(short = 'f', long = "flags")]
    flags: Option<PathBuf>,

    /// RPC port
    #[arg(short, long)]
    port: Option<u16>,

    /// Port for probes and metrics
    #[arg(short, long)]
    management_port: Option<u16>,

    /// Serve on this Unix socket instead of TCP
    #[arg(short = 'd', long)]
    socket_path: Option<PathBuf>,

    /// TLS certificate (PEM)
    #[arg(short = 'c', long)]
    cert_path: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(short = 'k', long)]
    key_path: Option<PathBuf>,

    /// Allowed CORS origin (repeatable)
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,

    /// Log output format: pretty or json
    #[arg(long)]
    log_format: Option<String>,
}

impl StartArgs {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(path) = self.flags {
            config.flags.path = Some(path);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(port) = self.management_port {
            config.server.management_port = port;
        }
        if self.socket_path.is_some() {
            config.server.socket_path = self.socket_path;
        }
        if self.cert_path.is_some() {
            config.server.cert_path = self.cert_path;
        }
        if self.key_path.is_some() {
            config.server.key_path = self.key_path;
        }
        if !self.cors_origins.is_empty() {
            config.server.cors_origins = self.cors_origins;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => start(args).await,
    }
}

async fn start(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "flag-service starting");

    let store = Arc::new(match &config.flags.path {
        Some(path) => FlagStore::from_file(path)?,
        None => {
            tracing::warn!("No flag file configured; serving an empty flag set");
            let store = FlagStore::new();
            store.replace(FlagDocument::default());
            store
        }
    });
    tracing::info!(flags = store.len(), "Flags loaded");

    let service = FlagService::new(config.clone());
    let shutdown = Shutdown::new();

    let _watcher = match (&config.flags.path, config.flags.watch) {
        (Some(path), true) => {
            let (watcher, updates) = FlagWatcher::new(path);
            let handle = watcher.run()?;
            tokio::spawn(apply_updates(
                Arc::clone(&store),
                service.bus(),
                updates,
                shutdown.subscribe(),
            ));
            Some(handle)
        }
        _ => None,
    };

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                tracing::info!(signal, "Received signal, shutting down");
                on_signal.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
        }
    });

    let probe_store = Arc::clone(&store);
    let readiness: ReadinessProbe = Arc::new(move || probe_store.is_ready());
    let evaluator: Arc<dyn Evaluator> = store;

    let result = service
        .serve(evaluator, readiness, shutdown.subscribe())
        .await;
    shutdown.trigger();
    result?;

    Ok(())
}
