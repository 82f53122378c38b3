//! Loremaster CLI: the main entry point.
//!
//! Commands:
//! - `serve`   : Start the HTTP chat server
//! - `history` : Print the conversation log
//! - `models`  : Check which candidate models are installed
//! - `pull`    : Download a model onto the backend host
//! - `status`  : Show effective configuration
//! - `doctor`  : Diagnose config, storage and backend health
//! - `onboard` : Write a starter config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "loremaster",
    about = "Loremaster — a narrative chat server backed by local language models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the conversation log, oldest first
    History {
        /// Only show the most recent N turns
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check which candidate models are installed
    Models,

    /// Download a model onto the backend host
    Pull {
        /// Model identifier, e.g. `llama2:7b`
        model: String,
    },

    /// Show effective configuration
    Status,

    /// Diagnose config, storage and backend health
    Doctor,

    /// Write a starter config file
    Onboard,
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::History { limit } => commands::history::run(limit).await?,
        Commands::Models => commands::models::run().await?,
        Commands::Pull { model } => commands::pull::run(&model).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
