//! Tally CLI - run the ledger service and manage its data

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, audit, init, seed, serve, status};

/// Tally - a small ledger service with token-guarded transfers
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides settings.json)
        #[arg(long, env = "TALLY_LISTEN_ADDR")]
        listen: Option<String>,
        /// Create the demo accounts before serving
        #[arg(long)]
        seed: bool,
    },

    /// Write a fresh token signing secret to settings.json
    Init {
        /// Replace an existing secret without asking
        #[arg(long, short)]
        force: bool,
    },

    /// Create demo accounts
    Seed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage accounts directly in the store
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// View and manage the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommands,
    },

    /// Show ledger status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { listen, seed } => serve::run(listen, seed),
        Commands::Init { force } => init::run(force),
        Commands::Seed { json } => seed::run(json),
        Commands::Account { command } => account::run(command),
        Commands::Audit { command } => audit::run(command),
        Commands::Status { json } => status::run(json),
    }
}
