//! Audit command - view and manage the audit trail

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use tally_core::services::audit::now_ms;

use crate::output::{self, format_timestamp};

use super::get_context;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show recent audit events
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only denied requests and failed logins
        #[arg(long)]
        denials: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old audit events
    Clear {
        /// Delete events older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show audit statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AuditCommands) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.audit_service;

    match command {
        AuditCommands::List {
            limit,
            denials,
            json,
        } => {
            let entries = if denials {
                service.get_denials(limit)?
            } else {
                service.get_recent(limit)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No audit events found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "Account ID", "Number", "Reason"]);
            for entry in entries {
                let reason = match entry.reason {
                    Some(reason) => reason.red().to_string(),
                    None => String::new(),
                };
                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event,
                    entry.account_id.map(|id| id.to_string()).unwrap_or_default(),
                    entry.account_number.map(|n| n.to_string()).unwrap_or_default(),
                    reason,
                ]);
            }
            println!("{}", table);
        }
        AuditCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let cutoff_ms = now_ms() - (older_than_days as i64 * 24 * 60 * 60 * 1000);

            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!(
                        "Delete audit events older than {} days?",
                        older_than_days
                    ))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = service.delete_before(cutoff_ms)?;

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                println!("Deleted {} audit events", deleted);
            }
        }
        AuditCommands::Stats { json } => {
            let stats = service.stats()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", "Audit Statistics".bold());
                println!("  Total events: {}", stats.total);
                println!("  Denials: {}", stats.denials);
                if let Some(oldest) = stats.oldest_timestamp {
                    println!("  Oldest: {}", format_timestamp(oldest));
                }
            }
        }
    }

    Ok(())
}
