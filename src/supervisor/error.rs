//! Supervisor error taxonomy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("site '{site}': no binary at {}", path.display())]
    BinaryNotFound { site: String, path: PathBuf },

    #[error("site '{site}': deploy into run slot failed: {source}")]
    DeployFailed {
        site: String,
        #[source]
        source: io::Error,
    },

    #[error("site '{site}': failed to start: {source}")]
    StartFailed {
        site: String,
        #[source]
        source: io::Error,
    },

    #[error("site '{site}': health check on port {port} timed out")]
    HealthCheckTimeout { site: String, port: u16 },

    #[error("site '{site}': unhealthy: {reason}")]
    Unhealthy { site: String, reason: String },

    #[error("site '{site}': no rollback image available")]
    RollbackUnavailable { site: String },

    #[error("another supervisor is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("failed to build health check client: {0}")]
    HealthClient(#[source] reqwest::Error),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl SupervisorError {
    /// Fatal errors abort the loop. Everything else is local to one site and
    /// is retried on a later pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SupervisorError::StoreUnavailable(_)
                | SupervisorError::AlreadyRunning(_)
                | SupervisorError::HealthClient(_)
        )
    }

    pub fn site(&self) -> Option<&str> {
        match self {
            SupervisorError::BinaryNotFound { site, .. }
            | SupervisorError::DeployFailed { site, .. }
            | SupervisorError::StartFailed { site, .. }
            | SupervisorError::HealthCheckTimeout { site, .. }
            | SupervisorError::Unhealthy { site, .. }
            | SupervisorError::RollbackUnavailable { site } => Some(site),
            _ => None,
        }
    }
}
