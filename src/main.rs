// MIT License - Copyright (c) 2026 Peter Wright
// Gateway daemon

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info, warn};

use paradox_gateway::config::GatewayConfig;
use paradox_gateway::interface::ip::IpInterface;
use paradox_gateway::interface::log::LogInterface;
use paradox_gateway::interface::mqtt::MqttInterface;
use paradox_gateway::supervisor::start_interfaces;
use paradox_gateway::{Engine, GatewayError, Interface, InterfaceManager, RetryPolicy, StopOutcome, Supervisor, transport};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "paradox-gateway")]
#[command(about = "Gateway between a Paradox alarm panel and MQTT / TCP clients")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

/// Exit status: 0 normal shutdown, 1 configuration or startup error,
/// 2 connection attempts exhausted.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<GatewayError>() {
        Some(GatewayError::ConnectAttemptsExhausted { .. }) => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

fn init_tracing() {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=paradox_gateway=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Interfaces enabled in the config, with their replay flag.
fn configured_interfaces(config: &GatewayConfig) -> Vec<(Arc<dyn Interface>, bool)> {
    let mut candidates: Vec<(Arc<dyn Interface>, bool)> = Vec::new();
    let labels = &config.labels;
    if let Some(mqtt) = &config.interfaces.mqtt {
        let mqtt: Arc<dyn Interface> = Arc::new(MqttInterface::new(mqtt.clone(), labels.clone()));
        candidates.push((mqtt, true));
    }
    if let Some(ip) = &config.interfaces.ip {
        let ip: Arc<dyn Interface> = Arc::new(IpInterface::new(ip.clone(), labels.clone()));
        candidates.push((ip, false));
    }
    if let Some(log) = &config.interfaces.log {
        let log: Arc<dyn Interface> = Arc::new(LogInterface::new(log.clone(), labels.clone()));
        candidates.push((log, false));
    }
    candidates
}

async fn run(cli: &Cli) -> Result<()> {
    let config = GatewayConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    let settings = config.engine_settings()?;

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let (stop_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
        let _ = stop_tx.send(true);
    });

    let manager = InterfaceManager::new(settings.command_queue_depth);
    let candidates = configured_interfaces(&config);
    if candidates.is_empty() {
        warn!("No interfaces configured; panel state will only be tracked");
    }
    start_interfaces(&manager, candidates).await;

    let transport = transport::from_config(&config.connection, settings.model);
    let engine = Engine::new(settings, manager.clone())?;
    let retry = RetryPolicy::from(&config.retry);

    info!("Gateway running. Send SIGINT/SIGTERM to stop.");
    let reports = Supervisor::new(manager, engine, transport, retry, shutdown).run().await?;

    let abandoned = reports
        .iter()
        .filter(|r| r.outcome == StopOutcome::Abandoned)
        .count();
    if abandoned > 0 {
        warn!("{} interfaces did not stop cleanly", abandoned);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            exit_code_for(&e)
        }
    }
}
