//! Run command - the supervisor in the foreground

use anyhow::{Context, Result};

use super::open_store;
use crate::config::KeeperConfig;
use crate::control::Control;
use crate::discovery::StoreDiscovery;
use crate::logging::{self, SUPERVISOR_LOG_FILE};
use crate::supervisor::Supervisor;

/// Run the supervisor until SIGTERM, SIGINT or SIGHUP.
pub fn execute(config: &KeeperConfig) -> Result<()> {
    logging::init(Some(&config.logs_dir().join(SUPERVISOR_LOG_FILE)))?;

    let store = open_store(config)?;
    let control = Control::install().context("Failed to install signal handlers")?;

    let resolver = config.clone();
    let discovery = StoreDiscovery::new(store.clone(), move |site| resolver.binary_path(site));

    let mut supervisor = Supervisor::new(store, discovery, config.supervisor_config(), control)
        .context("Failed to create supervisor")?;

    tracing::info!(
        state_dir = %config.state_dir.display(),
        sites_root = %config.sites_root.display(),
        "starting supervisor"
    );
    supervisor.run().context("Supervisor stopped with an error")?;
    Ok(())
}
