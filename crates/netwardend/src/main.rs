//! netwardend — the netwarden daemon.
//!
//! Single binary that assembles every netwarden subsystem:
//! - Inventory store (redb)
//! - SNMPv2c protocol client
//! - Telemetry poller (one loop per device)
//! - Change governance
//! - REST API
//!
//! # Usage
//!
//! ```text
//! netwardend run --config /etc/netwarden/netwarden.toml
//! netwardend check --config /etc/netwarden/netwarden.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use netwarden_core::{LogConfig, LogFormat, NetwardenConfig};

#[derive(Parser)]
#[command(name = "netwardend", about = "netwarden telemetry and alerting daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the poller and the API server until interrupted.
    Run {
        /// Configuration file. Missing file means defaults.
        #[arg(long, default_value = "netwarden.toml")]
        config: PathBuf,

        /// Listen address, overrides `[server].listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Data directory, overrides `[storage].path`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate a configuration file and print the effective settings.
    Check {
        #[arg(long, default_value = "netwarden.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            data_dir,
        } => {
            let (mut config, missing) = NetwardenConfig::load_or_default(&config)?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(dir) = data_dir {
                config.storage.path = dir.join("netwarden.redb");
            }
            config.validate()?;
            init_tracing(&config.log)?;
            for warning in missing.into_iter().chain(config.warnings()) {
                warn!("{warning}");
            }
            daemon::run(config).await
        }
        Command::Check { config } => {
            let parsed = NetwardenConfig::from_file(&config)?;
            println!("{} is valid", config.display());
            for warning in parsed.warnings() {
                println!("warning: {warning}");
            }
            print!("{}", parsed.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
