//! `keeper.toml`: on-disk configuration shared by every subcommand.
//!
//! Every field has a default, so a missing file (or a partial one) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fingerprint::FingerprintMode;
use crate::store::{StoreOptions, DEFAULT_START_PORT};
use crate::supervisor::{HealthConfig, PollConfig, RestartPolicy, SupervisorConfig};

/// Placeholder for the site name in `binary_template`.
pub const SITE_PLACEHOLDER: &str = "{site}";

/// Placeholder for `sites_root` in `binary_template`.
pub const SITES_ROOT_PLACEHOLDER: &str = "{sites_root}";

const DEFAULT_BINARY_TEMPLATE: &str = "{sites_root}/{site}/target/release/{site}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration file schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeeperConfig {
    /// Directory for the state store, run slots and logs
    pub state_dir: PathBuf,
    /// Directory whose subdirectories are sites
    pub sites_root: PathBuf,
    /// Where a site's built binary lives
    pub binary_template: String,
    /// File whose presence marks a site directory as dynamic
    pub dynamic_marker: String,
    pub start_port: u16,
    pub fingerprint: FingerprintMode,
    /// Environment variable carrying the port (empty to disable)
    pub port_env: String,
    /// Argument flag carrying the port (empty to disable)
    pub port_arg: String,
    pub poll: PollSection,
    pub restart: RestartSection,
    pub health: HealthSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSection {
    pub min_secs: u64,
    pub max_secs: u64,
    pub backoff_factor: f64,
    pub idle_passes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartSection {
    pub rollback_window_secs: u64,
    pub min_uptime_secs: u64,
    pub stop_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthSection {
    pub every_cycles: u32,
    pub path: String,
    pub timeout_ms: u64,
    pub grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub lock_timeout_ms: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            state_dir: dirs::data_local_dir()
                .map(|d| d.join("keeper"))
                .unwrap_or_else(|| PathBuf::from(".keeper")),
            sites_root: dirs::home_dir()
                .map(|d| d.join("sites"))
                .unwrap_or_else(|| PathBuf::from("sites")),
            binary_template: DEFAULT_BINARY_TEMPLATE.to_string(),
            dynamic_marker: "Cargo.toml".to_string(),
            start_port: DEFAULT_START_PORT,
            fingerprint: FingerprintMode::default(),
            port_env: "PORT".to_string(),
            port_arg: "--port".to_string(),
            poll: PollSection::default(),
            restart: RestartSection::default(),
            health: HealthSection::default(),
            store: StoreSection::default(),
        }
    }
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            min_secs: 2,
            max_secs: 60,
            backoff_factor: 2.0,
            idle_passes: 3,
        }
    }
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            rollback_window_secs: 30,
            min_uptime_secs: 3,
            stop_timeout_secs: 5,
        }
    }
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            every_cycles: 5,
            path: "/".to_string(),
            timeout_ms: 2000,
            grace_secs: 10,
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
        }
    }
}

impl KeeperConfig {
    /// Default location: `<config_dir>/keeper/keeper.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("keeper").join("keeper.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicitly given path must exist; a missing default file yields the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.binary_template.contains(SITE_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "binary_template must contain {SITE_PLACEHOLDER}"
            )));
        }
        if self.poll.min_secs == 0 {
            return Err(ConfigError::Invalid("poll.min_secs must be at least 1".into()));
        }
        if self.poll.min_secs > self.poll.max_secs {
            return Err(ConfigError::Invalid(format!(
                "poll.min_secs ({}) exceeds poll.max_secs ({})",
                self.poll.min_secs, self.poll.max_secs
            )));
        }
        if self.poll.backoff_factor.is_nan() || self.poll.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "poll.backoff_factor must be at least 1.0".into(),
            ));
        }
        if self.health.every_cycles == 0 {
            return Err(ConfigError::Invalid(
                "health.every_cycles must be at least 1".into(),
            ));
        }
        if !self.health.path.starts_with('/') {
            return Err(ConfigError::Invalid("health.path must start with '/'".into()));
        }
        if self.dynamic_marker.is_empty() {
            return Err(ConfigError::Invalid("dynamic_marker cannot be empty".into()));
        }
        Ok(())
    }

    /// Expand `binary_template` for `site`.
    pub fn binary_path(&self, site: &str) -> PathBuf {
        let root = self.sites_root.to_string_lossy();
        PathBuf::from(
            self.binary_template
                .replace(SITES_ROOT_PLACEHOLDER, &root)
                .replace(SITE_PLACEHOLDER, site),
        )
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            start_port: self.start_port,
            lock_timeout: Duration::from_millis(self.store.lock_timeout_ms),
        }
    }

    /// Runtime settings for the supervisor loop.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            run_dir: self.state_dir.join("run"),
            logs_dir: self.logs_dir(),
            fingerprint_mode: self.fingerprint,
            port_env: non_empty(&self.port_env),
            port_arg: non_empty(&self.port_arg),
            poll: PollConfig {
                min: Duration::from_secs(self.poll.min_secs),
                max: Duration::from_secs(self.poll.max_secs),
                backoff_factor: self.poll.backoff_factor,
                idle_passes: self.poll.idle_passes,
            },
            restart: RestartPolicy {
                rollback_window: Duration::from_secs(self.restart.rollback_window_secs),
                min_uptime: Duration::from_secs(self.restart.min_uptime_secs),
                stop_timeout: Duration::from_secs(self.restart.stop_timeout_secs),
            },
            health: HealthConfig {
                every_cycles: self.health.every_cycles,
                path: self.health.path.clone(),
                timeout: Duration::from_millis(self.health.timeout_ms),
                grace: Duration::from_secs(self.health.grace_secs),
            },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
