//! Client side of the signal protocol: how the change notifier and the
//! restart requester reach a running supervisor.

use std::io;
use thiserror::Error;

use super::signals::{RESCAN_SIGNAL, RESTART_QUEUE_SIGNAL};
use crate::process::{is_process_alive, send_signal};
use crate::store::{StateStore, StoreError, SUPERVISOR_PID_KEY};
use crate::validation::{validate_site_name, NameError};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("no supervisor is registered")]
    NoSupervisor,

    #[error("registered supervisor (pid {0}) is not running")]
    SupervisorNotRunning(u32),

    #[error("failed to signal supervisor (pid {pid}): {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// PID stored in the supervisor config slot, if any. Unparseable values
/// count as unregistered.
pub fn registered_supervisor(store: &StateStore) -> Result<Option<u32>, StoreError> {
    Ok(store
        .get_config(SUPERVISOR_PID_KEY)?
        .and_then(|raw| raw.trim().parse::<u32>().ok()))
}

/// PID of the registered supervisor, provided it is alive.
pub fn live_supervisor(store: &StateStore) -> Result<u32, RequestError> {
    let pid = registered_supervisor(store)?.ok_or(RequestError::NoSupervisor)?;
    if !is_process_alive(pid) {
        return Err(RequestError::SupervisorNotRunning(pid));
    }
    Ok(pid)
}

/// Queue a restart of `site` and wake the supervisor.
///
/// Nothing is queued when no live supervisor is registered. Returns the PID
/// that was signalled.
pub fn request_restart(store: &StateStore, site: &str) -> Result<u32, RequestError> {
    validate_site_name(site)?;
    let pid = live_supervisor(store)?;

    store.queue_restart(site)?;
    send_signal(pid, RESTART_QUEUE_SIGNAL).map_err(|source| RequestError::Signal { pid, source })?;

    tracing::info!(site, pid, "restart requested");
    Ok(pid)
}

/// Ask the supervisor to reconcile now.
///
/// A missing or dead supervisor is logged and reported as `Ok(false)`; there
/// is nothing to wake and the next supervisor start will pick the changes up.
pub fn notify_rescan(store: &StateStore) -> Result<bool, RequestError> {
    let pid = match live_supervisor(store) {
        Ok(pid) => pid,
        Err(RequestError::NoSupervisor) => {
            tracing::warn!("no supervisor registered, skipping rescan signal");
            return Ok(false);
        }
        Err(RequestError::SupervisorNotRunning(pid)) => {
            tracing::warn!(pid, "registered supervisor is not running, skipping rescan signal");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    send_signal(pid, RESCAN_SIGNAL).map_err(|source| RequestError::Signal { pid, source })?;
    tracing::debug!(pid, "rescan signalled");
    Ok(true)
}
