//! Seed command - create demo accounts

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use tally_core::{Account, TallyContext};

use super::get_context;

/// (first name, last name, password, opening balance)
const DEMO_ACCOUNTS: &[(&str, &str, &str, i64)] = &[
    ("Ann", "Lee", "ann-demo-pw", 100),
    ("Bob", "Ray", "bob-demo-pw", 0),
];

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let created = seed_accounts(&ctx)?;

    if json {
        let accounts: Vec<_> = created
            .iter()
            .zip(DEMO_ACCOUNTS)
            .map(|(account, (_, _, password, _))| {
                json!({
                    "id": account.id,
                    "number": account.number,
                    "name": account.full_name(),
                    "balance": account.balance,
                    "password": password,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    println!("{}", "Demo accounts created".green());
    for (account, (_, _, password, _)) in created.iter().zip(DEMO_ACCOUNTS) {
        println!(
            "  {} number={} id={} balance={} password={}",
            account.full_name().bold(),
            account.number,
            account.id,
            account.balance,
            password.dimmed()
        );
    }
    Ok(())
}

/// Create the demo accounts and fund them
pub fn seed_accounts(ctx: &TallyContext) -> Result<Vec<Account>> {
    let mut created = Vec::with_capacity(DEMO_ACCOUNTS.len());
    for (first, last, password, balance) in DEMO_ACCOUNTS {
        let mut account = ctx.ledger_service.create_account(first, last, password)?;
        if *balance > 0 {
            account.balance = ctx.ledger_service.deposit(account.id, *balance)?.balance;
        }
        tracing::info!(number = account.number, "seeded account");
        created.push(account);
    }
    Ok(created)
}
