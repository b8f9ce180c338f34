//! Subcommand implementations behind the `keeper` binary.

pub mod import_legacy;
pub mod rescan;
pub mod restart;
pub mod run;
pub mod scan;
pub mod status;

use anyhow::{Context, Result};

use crate::config::KeeperConfig;
use crate::store::StateStore;

/// Open the state store described by `config`.
pub(crate) fn open_store(config: &KeeperConfig) -> Result<StateStore> {
    StateStore::open(&config.state_dir, config.store_options()).with_context(|| {
        format!(
            "Failed to open state store at {}",
            config.state_dir.display()
        )
    })
}
