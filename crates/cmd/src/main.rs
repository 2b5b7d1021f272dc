use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diagnostics::init_diagnostics;

mod commands;
mod config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "scenesync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "scenesync.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Init,
    /// Run one synchronization cycle now
    Run,
    /// Run the daily synchronization daemon
    Daemon,
    /// Serve the signed-reference relay
    Relay,
    /// Reset a failed scene so the next cycle retries it
    Reset {
        /// Scene identifier to reset
        scene_id: String,
    },
    /// Show scene ledger counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_diagnostics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            config::create_example_config(&cli.config)?;
            println!("Created example configuration file: {}", cli.config);
            println!("Edit it with your provider, storage and catalog credentials,");
            println!("then run: scenesync run --config {}", cli.config);
            Ok(())
        }
        Commands::Run => {
            let config = load(&cli.config)?;
            commands::run_command(&config).await
        }
        Commands::Daemon => {
            let config = load(&cli.config)?;
            commands::daemon_command(&config).await
        }
        Commands::Relay => {
            let config = load(&cli.config)?;
            commands::relay_command(&config).await
        }
        Commands::Reset { scene_id } => {
            let config = load(&cli.config)?;
            commands::reset_command(&config, &scene_id).await
        }
        Commands::Status => {
            let config = load(&cli.config)?;
            commands::status_command(&config).await
        }
    }
}

fn load(path: &str) -> Result<config::SyncConfig> {
    config::load_config(path).with_context(|| format!("Failed to load configuration from {path}"))
}
