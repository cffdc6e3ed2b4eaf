//! CLI command implementations

pub mod account;
pub mod audit;
pub mod init;
pub mod seed;
pub mod serve;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tally_core::config::Config;
use tally_core::TallyContext;

/// Get the tally directory from environment or default
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .context("Could not find home directory; set TALLY_DIR")
}

/// Load configuration, creating the tally directory if needed
pub fn load_config() -> Result<Config> {
    let tally_dir = get_tally_dir()?;
    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create tally directory: {:?}", tally_dir))?;
    Config::load(&tally_dir).context("Failed to load settings")
}

/// Get tally context from a loaded config
pub fn context_from(config: Config) -> Result<TallyContext> {
    TallyContext::from_config(config).context("Failed to initialize tally context")
}

/// Get tally context with the on-disk configuration
pub fn get_context() -> Result<TallyContext> {
    context_from(load_config()?)
}
