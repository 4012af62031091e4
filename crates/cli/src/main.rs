//! Deskhive CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write the default configuration file
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Show configuration and worker defaults

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deskhive",
    about = "Deskhive — supervised AI workers with a token-budgeted context engine",
    version,
    author
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
    /// Initialize the configuration file
    Onboard,

    /// Chat with a worker
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Worker to address: main, context-manager, summarizer or planner
        #[arg(short, long, default_value = "main")]
        worker: String,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message, worker } => commands::chat::run(message, &worker).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
