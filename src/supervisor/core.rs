//! Supervisor struct, registration and the main loop.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::process::Child;

use super::config::SupervisorConfig;
use super::error::SupervisorError;
use super::health::HealthChecker;
use super::polling::PollInterval;
use crate::control::{registered_supervisor, Control};
use crate::discovery::DiscoverySource;
use crate::fingerprint::Fingerprint;
use crate::process::is_process_alive;
use crate::store::{ProcessRecord, StateStore, SUPERVISOR_PID_KEY};

/// Keeps every discovered worker running.
///
/// Logically single-threaded: each pass runs to completion before the next
/// begins, and control requests are only looked at between passes.
pub struct Supervisor<D: DiscoverySource> {
    pub(super) store: StateStore,
    pub(super) discovery: D,
    pub(super) config: SupervisorConfig,
    pub(super) control: Control,
    pub(super) health: HealthChecker,
    /// Children spawned by this instance. Records without a handle here were
    /// adopted from a previous supervisor and are tracked by PID only.
    pub(super) children: HashMap<String, Child>,
    /// Builds that crashed right after deployment and were rolled back
    pub(super) suspect: HashMap<String, Fingerprint>,
    /// Spawn failures, replayed as crashes on the next pass
    pub(super) failed_starts: HashMap<String, ProcessRecord>,
    /// Last time each tracked worker was seen running. Bounds crash uptime
    /// when a death is only noticed several passes later.
    pub(super) last_alive: HashMap<String, DateTime<Utc>>,
    /// Sites whose missing binary was already reported
    pub(super) reported_missing: HashSet<String>,
    pub(super) cycles: u64,
}

impl<D: DiscoverySource> Supervisor<D> {
    pub fn new(
        store: StateStore,
        discovery: D,
        config: SupervisorConfig,
        control: Control,
    ) -> Result<Self, SupervisorError> {
        let health = HealthChecker::new(&config.health)?;
        Ok(Self {
            store,
            discovery,
            config,
            control,
            health,
            children: HashMap::new(),
            suspect: HashMap::new(),
            failed_starts: HashMap::new(),
            last_alive: HashMap::new(),
            reported_missing: HashSet::new(),
            cycles: 0,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Number of reconcile passes run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Publish this process as the supervisor so other processes can signal it.
    ///
    /// Fails if a different, live process is already registered.
    pub fn register(&self) -> Result<(), SupervisorError> {
        let own_pid = std::process::id();
        if let Some(pid) = registered_supervisor(&self.store)? {
            if pid != own_pid && is_process_alive(pid) {
                return Err(SupervisorError::AlreadyRunning(pid));
            }
        }
        self.store
            .set_config(SUPERVISOR_PID_KEY, &own_pid.to_string())?;
        tracing::info!(pid = own_pid, "supervisor registered");
        Ok(())
    }

    /// Run until shutdown is requested.
    ///
    /// On shutdown every tracked worker is stopped and the registration is
    /// cleared. A fatal error ends the loop without stopping workers; a later
    /// supervisor adopts them through their stored PIDs.
    pub fn run(&mut self) -> Result<(), SupervisorError> {
        self.register()?;

        if let Err(e) = self.run_loop() {
            tracing::error!(error = %e, "supervisor loop aborted");
            if let Err(clear) = self.store.clear_config(SUPERVISOR_PID_KEY) {
                tracing::error!(error = %clear, "failed to clear supervisor registration");
            }
            return Err(e);
        }

        tracing::info!("shutdown requested, stopping workers");
        self.stop_all()?;
        self.store.clear_config(SUPERVISOR_PID_KEY)?;
        tracing::info!("supervisor stopped");
        Ok(())
    }

    fn run_loop(&mut self) -> Result<(), SupervisorError> {
        let mut poll = PollInterval::new(self.config.poll.clone());
        // Requests queued while no supervisor was running
        let mut drain_queue = true;

        while !self.control.shutdown_requested() {
            let queue_requested =
                std::mem::take(&mut drain_queue) | self.control.take_restart_queue();
            if queue_requested && self.process_restart_queue()? {
                poll.reset();
            }

            let rescan = self.control.take_rescan();
            if rescan {
                tracing::debug!("rescan requested");
            }

            let changed = self.reconcile()?;
            if changed || rescan {
                poll.reset();
            } else {
                poll.record_idle();
            }

            if self.cycles % u64::from(self.config.health.every_cycles.max(1)) == 0
                && self.health_check()?
            {
                poll.reset();
            }

            tracing::trace!(interval = ?poll.current(), "sleeping");
            self.control.wait(poll.current());
        }

        Ok(())
    }

    /// Names with a process record or a live child handle, sorted.
    pub(super) fn tracked_sites(&self) -> Result<BTreeSet<String>, SupervisorError> {
        let mut tracked: BTreeSet<String> =
            self.store.list_tracked_processes()?.into_iter().collect();
        tracked.extend(self.children.keys().cloned());
        Ok(tracked)
    }

    /// Stop every tracked worker.
    pub fn stop_all(&mut self) -> Result<(), SupervisorError> {
        for site in self.tracked_sites()? {
            self.stop_site(&site)?;
        }
        Ok(())
    }
}
