//! Rescan command - wake the supervisor without touching the store

use anyhow::Result;
use colored::Colorize;

use super::open_store;
use crate::config::KeeperConfig;
use crate::control::notify_rescan;

pub fn execute(config: &KeeperConfig) -> Result<()> {
    let store = open_store(config)?;

    if notify_rescan(&store)? {
        println!("{} Rescan requested", "✓".green().bold());
    } else {
        println!("{} Supervisor is not running", "─".dimmed());
    }
    Ok(())
}
