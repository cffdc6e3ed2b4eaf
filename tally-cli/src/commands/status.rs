//! Status command - show ledger status and summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use crate::output;

use super::get_context;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Total balance", &status.total_balance.to_string()]);
    table.add_row(vec!["Audit events", &status.audit_events.to_string()]);
    table.add_row(vec!["Database", &status.database]);
    println!("{}", table);

    if !status.accounts.is_empty() {
        println!();
        let mut accounts = output::create_table();
        accounts.set_header(vec!["ID", "Number", "Name", "Balance"]);
        for account in &status.accounts {
            accounts.add_row(vec![
                account.id.to_string(),
                account.number.to_string(),
                account.name.clone(),
                account.balance.to_string(),
            ]);
        }
        println!("{}", accounts);
    }

    Ok(())
}
