//! PicoClaw CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Initialize the state directory, config, and workspace
//! - `agent`   — Interactive chat or single-message mode
//! - `daemon`  — Run the agent with hot reload (file watcher + SIGHUP)
//! - `status`  — Show configuration and skills at a glance

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "picoclaw",
    about = "PicoClaw — ultra-lightweight personal AI agent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run the agent daemon with hot reload
    Daemon,

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run()?,
        Commands::Agent { message } => commands::agent::run(message).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Status => commands::status::run()?,
    }

    Ok(())
}
