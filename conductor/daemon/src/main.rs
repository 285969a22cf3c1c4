//! RDP Conductor Daemon
//!
//! Standalone server process owning the single session orchestrator. The
//! JSON-RPC gateway and the chat surface are served over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default address (127.0.0.1:5000)
//! rdp-conductor
//!
//! # Custom address and profile directory
//! rdp-conductor --bind 0.0.0.0 --port 8080 --profiles-dir /srv/rdp/profiles
//!
//! # With verbose logging
//! RUST_LOG=debug rdp-conductor
//! ```
//!
//! # Environment Variables
//!
//! - `RDP_CONDUCTOR_*`: see the `config` module of the core crate
//! - `OPENAI_API_KEY` / `AZURE_OPENAI_API_KEY` + `AZURE_OPENAI_ENDPOINT`:
//!   enable model-backed intent parsing
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (cancels pending connects, disconnects
//!   every session)

mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use rdp_conductor_core::{
    load_config_from_path, Assistant, ChatCompletionsBackend, CommandDispatcher, ConductorConfig,
    ConfigOverrides, ConversationStore, IntentParser, JsonFileProfileStore, PerformanceMonitor,
    ProfileStore, RpcGateway, SessionOrchestrator, SimulatedCapture, SimulatedConnector,
};

use crate::server::AppState;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "rdp-conductor", version, about = "Remote desktop session conductor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "RDP_CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for saved connection profiles
    #[arg(long)]
    profiles_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new(level)
            .add_directive(format!("rdp_conductor_daemon={level}").parse()?)
            .add_directive(format!("rdp_conductor_core={level}").parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

fn build_orchestrator(config: &ConductorConfig) -> SessionOrchestrator {
    let connector = config
        .unreachable_hosts
        .iter()
        .fold(
            SimulatedConnector::new(config.simulated_connect_delay),
            |connector, host| connector.with_unreachable_host(host.clone()),
        );
    let capture = match &config.screenshot_dir {
        Some(dir) => SimulatedCapture::new(dir.clone()),
        None => SimulatedCapture::default(),
    };
    SessionOrchestrator::new(Arc::new(connector), Arc::new(capture), config.orchestrator())
}

fn build_parser(config: &ConductorConfig) -> anyhow::Result<IntentParser> {
    match ChatCompletionsBackend::from_config(&config.backend, config.model_timeout)? {
        Some(backend) => {
            info!(backend = config.backend.label(), "Model-backed intent parsing enabled");
            Ok(IntentParser::with_backend(Arc::new(backend), config.model_timeout))
        }
        None => {
            info!("No model backend configured, using rule-based parsing");
            Ok(IntentParser::rules_only())
        }
    }
}

fn open_profiles(config: &ConductorConfig) -> anyhow::Result<JsonFileProfileStore> {
    let dir = config
        .profiles_dir
        .clone()
        .or_else(JsonFileProfileStore::default_dir)
        .context("No profile directory configured and no platform data directory found")?;
    let store = JsonFileProfileStore::open(&dir)
        .with_context(|| format!("Failed to open profile directory {}", dir.display()))?;
    info!(path = %store.dir().display(), "Profile store ready");
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting RDP Conductor");
    info!("PID: {}", std::process::id());

    let mut config = load_config_from_path(
        args.config
            .clone()
            .or_else(rdp_conductor_core::default_config_path),
    )?;
    let mut overrides = ConfigOverrides::new();
    if let Some(bind) = args.bind.clone() {
        overrides = overrides.with_bind_address(bind);
    }
    if let Some(port) = args.port {
        overrides = overrides.with_port(port);
    }
    if let Some(dir) = args.profiles_dir.clone() {
        overrides = overrides.with_profiles_dir(dir);
    }
    overrides.apply(&mut config);
    config.validate()?;
    info!(source = %config.source(), "Configuration loaded");

    let orchestrator = build_orchestrator(&config);
    let profiles: Arc<dyn ProfileStore> = Arc::new(open_profiles(&config)?);
    let conversations = Arc::new(ConversationStore::new());

    let assistant = Assistant::new(
        build_parser(&config)?,
        CommandDispatcher::new(orchestrator.clone(), profiles.clone()),
        conversations.clone(),
        config.assistant(),
    );
    let monitor = PerformanceMonitor::new();
    let monitor_task = monitor.spawn(&orchestrator);
    let gateway = Arc::new(RpcGateway::with_monitor(&orchestrator, profiles, monitor));

    // Periodic conversation pruning
    let idle_timeout = config.conversation_idle_timeout;
    let prune_every = idle_timeout.max(Duration::from_secs(60)) / 4;
    let pruner = tokio::spawn(async move {
        let mut interval = tokio::time::interval(prune_every);
        loop {
            interval.tick().await;
            let removed = conversations.prune_idle(idle_timeout);
            if removed > 0 {
                info!(removed, "Pruned idle conversations");
            }
        }
    });

    let app = server::router(AppState {
        gateway,
        assistant,
        orchestrator: orchestrator.clone(),
    });

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(address = %address, "Listening for requests");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutting down");
    pruner.abort();
    monitor_task.abort();
    orchestrator.shutdown();
    if !orchestrator.disconnect_all().await {
        warn!("Some sessions did not disconnect cleanly");
    }
    info!("RDP Conductor stopped");

    served.context("HTTP server failed")
}
