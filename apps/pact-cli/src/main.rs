//! # pact-cli
//!
//! Command-line interface for Pact goal negotiation.
//!
//! - `pact goal create/list/status` — propose and inspect goals
//! - `pact goal approve/suggest/respond/accept` — negotiate a pending goal
//! - `pact goal tick/check-deadline` — record progress, nudge auto-approval
//! - `pact notify list/read/delete/clear` — work through an inbox
//! - `pact sweep` — run the deadline watcher

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pact_negotiation::PactConfig;
use tracing_subscriber::EnvFilter;

/// Pact — goals negotiated between a recipient and a giver.
#[derive(Parser)]
#[command(name = "pact", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose, negotiate, and track goals.
    Goal {
        #[command(subcommand)]
        command: commands::goal::GoalCommands,
    },
    /// Read and dismiss notifications.
    Notify {
        #[command(subcommand)]
        command: commands::notify::NotifyCommands,
    },
    /// Auto-approve goals whose approval deadline has passed.
    Sweep {
        /// Run a single sweep and exit.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = PactConfig::for_project(&project_root);
    let app = commands::App::open(config)?;

    match &cli.command {
        Commands::Goal { command } => commands::goal::execute(command, &app).await,
        Commands::Notify { command } => commands::notify::execute(command, &app).await,
        Commands::Sweep { once } => commands::sweep::execute(&app, *once).await,
    }
}

/// `RUST_LOG`, plus info for every workspace crate.
fn env_filter() -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for target in PACT_CRATES {
        filter = filter.add_directive(format!("{}=info", target).parse()?);
    }
    Ok(filter)
}

const PACT_CRATES: &[&str] = &["pact_store", "pact_goal", "pact_notify", "pact_negotiation"];
