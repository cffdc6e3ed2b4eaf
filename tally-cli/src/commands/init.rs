//! Init command - generate the token signing secret

use anyhow::{Context, Result};
use dialoguer::Confirm;

use tally_core::config::Config;

use crate::output;

use super::{get_tally_dir, load_config};

pub fn run(force: bool) -> Result<()> {
    let tally_dir = get_tally_dir()?;
    let existing = load_config()?;

    if !existing.jwt_secret.is_empty() && !force {
        output::warning("A signing secret is already configured.");
        println!("Replacing it invalidates every token issued so far.");
        if !Confirm::new()
            .with_prompt("Generate a new secret?")
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    Config::write_new_secret(&tally_dir).context("Failed to write settings")?;
    output::success(&format!(
        "Signing secret written to {}",
        tally_dir.join(tally_core::config::SETTINGS_FILE).display()
    ));
    Ok(())
}
