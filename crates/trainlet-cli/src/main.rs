//! trainlet CLI
//!
//! Command-line interface for interacting with a trainlet daemon.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// trainlet - queue-driven GPU training orchestrator
#[derive(Parser, Debug)]
#[command(name = "trainlet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Agent API address
    #[arg(long, default_value = "http://localhost:7070", global = true)]
    agent_api: String,

    /// Board API address
    #[arg(long, default_value = "http://localhost:6060", global = true)]
    board_api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check agent liveness
    Health,

    /// Show the agent's current run and ETA
    Status,

    /// Cancel the current run at the next epoch boundary
    Halt,

    /// Finish the current run early, recording it as succeeded
    Finish,

    /// Send a visualization liveness heartbeat for a run
    Heartbeat {
        /// Run UUID
        job_id: Uuid,
    },

    /// Show the embeddable visualization URL for a run
    Embed {
        /// Run UUID
        job_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let agent = commands::ApiClient::new(&cli.agent_api);
    let board = commands::ApiClient::new(&cli.board_api);

    match cli.command {
        Commands::Health => {
            commands::health(&agent).await?;
        }
        Commands::Status => {
            commands::status(&agent).await?;
        }
        Commands::Halt => {
            commands::halt(&agent).await?;
        }
        Commands::Finish => {
            commands::finish(&agent).await?;
        }
        Commands::Heartbeat { job_id } => {
            commands::heartbeat(&board, job_id).await?;
        }
        Commands::Embed { job_id } => {
            commands::embed(&board, job_id).await?;
        }
    }

    Ok(())
}
