//! wardend — the Warden daemon.
//!
//! Loads the service registry, opens the state store and sweeps every
//! configured service on `sweep.interval`:
//! probe → track → remediate → escalate.
//!
//! # Usage
//!
//! ```text
//! wardend --config /etc/warden/warden.toml run
//! wardend once
//! wardend check-config
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use warden_core::WardenConfig;
use warden_supervisor::{Supervisor, SweepReport};

#[derive(Parser)]
#[command(name = "wardend", about = "Warden service supervisor daemon", version)]
struct Cli {
    /// Path to the Warden configuration file.
    #[arg(long, env = "WARDEN_CONFIG", default_value = "/etc/warden/warden.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the fleet on the configured interval until interrupted.
    Run,
    /// Run a single sweep and exit; non-zero if any service is unhealthy.
    Once,
    /// Validate the configuration and print it with defaults filled in.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Run => run(config).await,
        Command::Once => {
            let supervisor = Supervisor::from_config(config)?;
            let report = supervisor.sweep_once().await;
            print_report(&report);
            if report.unhealthy() > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::CheckConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,warden=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<WardenConfig> {
    let config = WardenConfig::from_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    info!(path = %path.display(), services = config.services.len(), "configuration loaded");
    Ok(config)
}

async fn run(config: WardenConfig) -> anyhow::Result<()> {
    info!("Warden daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    // Fail fast on a bad store path or TLS setup before entering the loop.
    drop(Supervisor::from_config(config.clone())?);
    info!(path = %config.store.path.display(), "state store ready");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let interval = config.sweep.interval();
    let handle = tokio::spawn(warden_supervisor::run(
        interval,
        move || Supervisor::from_config(config.clone()),
        shutdown_rx,
    ));

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(e) = handle.await {
        warn!(error = %e, "sweep loop ended abnormally");
    }
    info!("Warden daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_report(report: &SweepReport) {
    for service in &report.services {
        let state = if service.busy {
            "busy"
        } else if service.healthy {
            "healthy"
        } else {
            "unhealthy"
        };
        let mut line = format!("{:<24} {state}", service.service);
        for kind in &service.transitions {
            line.push_str(&format!("  [{kind}]"));
        }
        if let Some(outcome) = &service.remediation {
            match outcome.skipped {
                Some(reason) => line.push_str(&format!("  restart skipped: {reason}")),
                None if outcome.recovered() => line.push_str("  restarted"),
                None => line.push_str("  restart failed"),
            }
        }
        if let Some(alert) = &service.alert {
            line.push_str(&format!("  alert: {alert:?}"));
        }
        for error in &service.errors {
            line.push_str(&format!("  error: {error}"));
        }
        println!("{line}");
    }
    println!(
        "\n{} services, {} unhealthy, {} alerts sent",
        report.services.len(),
        report.unhealthy(),
        report.alerts_sent()
    );
}
