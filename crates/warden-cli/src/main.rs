use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

const MAX_SILENCE_HOURS: u64 = 10 * 365 * 24;

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Warden — single-host service supervisor",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the Warden configuration file.
    #[arg(long, global = true, env = "WARDEN_CONFIG", default_value = "/etc/warden/warden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (probe, remediate, alert) now
    Check {
        /// Only this service (default: every service)
        service: Option<String>,
    },
    /// Show health, failure history, silences and alert counts
    Status {
        /// Only this service (default: every service)
        service: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = commands::status::Format::Text)]
        format: commands::status::Format,
    },
    /// Suppress alerts for a service
    Silence {
        service: String,
        /// Silence duration in hours (at most ten years)
        #[arg(default_value = "24", value_parser = clap::value_parser!(u64).range(1..=MAX_SILENCE_HOURS))]
        hours: u64,
    },
    /// Lift a silence
    Unsilence { service: String },
    /// List configured services
    List,
    /// Start a service
    Start { service: String },
    /// Stop a service (graceful, then forced)
    Stop { service: String },
    /// Restart a service and verify it comes back, bypassing the restart limits
    Restart { service: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Check { service } => commands::check::check(config, service.as_deref()).await,
        Commands::Status { service, format } => {
            commands::status::status(config, service.as_deref(), format)
        }
        Commands::Silence { service, hours } => commands::silence::silence(config, &service, hours),
        Commands::Unsilence { service } => commands::silence::unsilence(config, &service),
        Commands::List => commands::list::list(&config),
        Commands::Start { service } => commands::control::start(config, &service).await,
        Commands::Stop { service } => commands::control::stop(config, &service).await,
        Commands::Restart { service } => commands::control::restart(config, &service).await,
    }
}
