//! Account command - manage accounts directly in the store
//!
//! Operator access: these commands bypass the access guard and act on the
//! local database.

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Confirm, Input, Password};

use tally_core::Account;

use crate::output;

use super::get_context;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// List all accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a new account
    Create {
        /// First name
        #[arg(long)]
        first_name: Option<String>,
        /// Last name
        #[arg(long)]
        last_name: Option<String>,
        /// Password (prompted for if omitted)
        #[arg(long, env = "TALLY_ACCOUNT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one account
    Show {
        /// Account ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an account
    Delete {
        /// Account ID
        id: i64,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Add funds to an account
    Deposit {
        /// Account ID
        id: i64,
        /// Amount in minor units
        amount: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::List { json } => run_list(json),
        AccountCommands::Create {
            first_name,
            last_name,
            password,
            json,
        } => run_create(first_name, last_name, password, json),
        AccountCommands::Show { id, json } => run_show(id, json),
        AccountCommands::Delete { id, force } => run_delete(id, force),
        AccountCommands::Deposit { id, amount, json } => run_deposit(id, amount, json),
    }
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let accounts = ctx.ledger_service.list_accounts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Number", "Name", "Balance", "Created"]);
    for account in &accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.number.to_string(),
            account.full_name(),
            account.balance.to_string(),
            account.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_create(
    first_name: Option<String>,
    last_name: Option<String>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    let first_name = match first_name {
        Some(name) => name,
        None => Input::new().with_prompt("First name").interact_text()?,
    };
    let last_name = match last_name {
        Some(name) => name,
        None => Input::new().with_prompt("Last name").interact_text()?,
    };
    let password = match password {
        Some(pw) => pw,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    let account = ctx
        .ledger_service
        .create_account(&first_name, &last_name, &password)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        output::success("Account created");
        print_account(&account);
    }
    Ok(())
}

fn run_show(id: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = ctx.ledger_service.get_account(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        print_account(&account);
    }
    Ok(())
}

fn run_delete(id: i64, force: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = ctx.ledger_service.get_account(id)?;

    if !force {
        println!(
            "\n{}",
            format!(
                "This will permanently delete account {} ({}).",
                account.number,
                account.full_name()
            )
            .yellow()
        );
        if account.balance > 0 {
            output::warning(&format!(
                "The account still holds a balance of {}.",
                account.balance
            ));
        }
        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ctx.ledger_service.delete_account(id)?;
    output::success(&format!("Deleted account {}", account.number));
    Ok(())
}

fn run_deposit(id: i64, amount: i64, json: bool) -> Result<()> {
    if amount <= 0 {
        bail!("Amount must be a positive integer");
    }
    let ctx = get_context()?;
    let receipt = ctx.ledger_service.deposit(id, amount)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        output::success(&format!(
            "Deposited {} into {}; balance is now {}",
            amount, receipt.number, receipt.balance
        ));
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("  {}: {}", "ID".dimmed(), account.id);
    println!("  {}: {}", "Number".dimmed(), account.number);
    println!("  {}: {}", "Name".dimmed(), account.full_name());
    println!("  {}: {}", "Balance".dimmed(), account.balance);
    println!("  {}: {}", "Created".dimmed(), account.created_at.to_rfc3339());
}
