//! Runtime configuration for the supervisor loop.

use std::path::PathBuf;

use super::health::HealthConfig;
use super::policy::RestartPolicy;
use super::polling::PollConfig;
use crate::fingerprint::FingerprintMode;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Parent of every site's run and rollback slots
    pub run_dir: PathBuf,
    /// Per-site stdout/stderr logs
    pub logs_dir: PathBuf,
    pub fingerprint_mode: FingerprintMode,
    /// Environment variable carrying the port to the worker
    pub port_env: Option<String>,
    /// Argument flag carrying the port to the worker
    pub port_arg: Option<String>,
    pub poll: PollConfig,
    pub restart: RestartPolicy,
    pub health: HealthConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from(".keeper/run"),
            logs_dir: PathBuf::from(".keeper/logs"),
            fingerprint_mode: FingerprintMode::default(),
            port_env: Some("PORT".to_string()),
            port_arg: Some("--port".to_string()),
            poll: PollConfig::default(),
            restart: RestartPolicy::default(),
            health: HealthConfig::default(),
        }
    }
}
