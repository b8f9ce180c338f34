//! Shared helpers for keeper integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use keeper::config::KeeperConfig;
use keeper::control::Control;
use keeper::discovery::StoreDiscovery;
use keeper::fingerprint::FingerprintMode;
use keeper::store::StateStore;
use keeper::supervisor::Supervisor;

/// Worker that stays up until signalled.
pub const SLEEPER: &str = "#!/bin/sh\nexec sleep 30\n";

/// A sites root and a state directory inside one temp dir.
pub struct Workspace {
    pub temp: TempDir,
    pub config: KeeperConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let sites_root = temp.path().join("sites");
        fs::create_dir_all(&sites_root).expect("Failed to create sites root");

        let mut config = KeeperConfig::default();
        config.state_dir = temp.path().join("state");
        config.sites_root = sites_root;
        config.binary_template = "{sites_root}/{site}/bin/{site}".to_string();
        config.fingerprint = FingerprintMode::Sha256;
        config.poll.min_secs = 1;
        config.poll.max_secs = 1;
        config.health.every_cycles = 1000;

        Self { temp, config }
    }

    pub fn sites_root(&self) -> &Path {
        &self.config.sites_root
    }

    pub fn store(&self) -> StateStore {
        StateStore::open(&self.config.state_dir, self.config.store_options())
            .expect("Failed to open store")
    }

    /// Create a dynamic site directory with a built worker script.
    pub fn add_dynamic_site(&self, name: &str, script: &str) -> PathBuf {
        let dir = self.sites_root().join(name);
        fs::create_dir_all(dir.join("bin")).expect("Failed to create site dir");
        fs::write(dir.join("Cargo.toml"), "[package]\n").expect("Failed to write marker");
        let binary = self.config.binary_path(name);
        fs::write(&binary, script).expect("Failed to write worker script");
        binary
    }

    /// Create a static site directory.
    pub fn add_static_site(&self, name: &str) {
        let dir = self.sites_root().join(name);
        fs::create_dir_all(&dir).expect("Failed to create site dir");
        fs::write(dir.join("index.html"), "<h1>hi</h1>").expect("Failed to write page");
    }

    pub fn remove_site(&self, name: &str) {
        fs::remove_dir_all(self.sites_root().join(name)).expect("Failed to remove site");
    }

    pub fn supervisor(&self, control: Control) -> Supervisor<StoreDiscovery> {
        let store = self.store();
        let resolver = self.config.clone();
        let discovery = StoreDiscovery::new(store.clone(), move |site| resolver.binary_path(site));
        Supervisor::new(store, discovery, self.config.supervisor_config(), control)
            .expect("Failed to create supervisor")
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    check()
}
