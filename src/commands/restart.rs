//! Restart command - queue an on-demand restart of one site

use anyhow::{Context, Result};
use colored::Colorize;

use super::open_store;
use crate::config::KeeperConfig;
use crate::control::request_restart;

pub fn execute(config: &KeeperConfig, site: &str) -> Result<()> {
    let store = open_store(config)?;

    let pid = request_restart(&store, site)
        .with_context(|| format!("Failed to request restart of '{site}'"))?;

    println!(
        "{} Restart of {} queued {}",
        "✓".green().bold(),
        site.bold(),
        format!("(supervisor pid {pid})").dimmed()
    );
    Ok(())
}
