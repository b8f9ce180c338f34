//! The reconcile pass, restart-queue processing and periodic health checks.

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;

use super::core::Supervisor;
use super::error::SupervisorError;
use crate::discovery::{DiscoverySource, SiteDescriptor};
use crate::store::ProcessRecord;

/// What one site needed during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteAction {
    Unchanged,
    Started,
    Swapped,
    Recovered,
}

impl<D: DiscoverySource> Supervisor<D> {
    /// Compare desired against actual state and correct the difference.
    ///
    /// Returns whether anything was started, stopped or swapped. Only store
    /// failures abort the pass; per-site failures are logged and retried on the
    /// next pass.
    pub fn reconcile(&mut self) -> Result<bool, SupervisorError> {
        self.cycles += 1;
        let discovery = self.discovery.discover()?;
        self.report_missing(&discovery.missing);

        let mut changed = false;
        for desc in &discovery.desired {
            match self.reconcile_site(desc) {
                Ok(action) => changed |= action != SiteAction::Unchanged,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(site = %desc.name, error = %e, "reconcile failed for site");
                }
            }
        }

        let desired: HashSet<&str> = discovery.desired.iter().map(|d| d.name.as_str()).collect();
        for site in self.tracked_sites()? {
            if !desired.contains(site.as_str()) {
                tracing::info!(site = %site, "site no longer desired, stopping");
                self.stop_site(&site)?;
                self.suspect.remove(&site);
                changed = true;
            }
        }
        self.failed_starts
            .retain(|site, _| desired.contains(site.as_str()));

        Ok(changed)
    }

    fn reconcile_site(&mut self, desc: &SiteDescriptor) -> Result<SiteAction, SupervisorError> {
        let record = match self.store.get_process(&desc.name)? {
            Some(record) => Some(record),
            None => self.failed_starts.remove(&desc.name),
        };

        let Some(record) = record else {
            self.start_site(desc)?;
            return Ok(SiteAction::Started);
        };

        if !self.is_alive(&record) {
            self.recover_crash(desc, &record)?;
            return Ok(SiteAction::Recovered);
        }

        let source = self.source_fingerprint(desc)?;
        if source == record.fingerprint || self.suspect.get(&desc.name) == Some(&source) {
            return Ok(SiteAction::Unchanged);
        }

        tracing::info!(
            site = %desc.name,
            running = %record.fingerprint,
            built = %source,
            "rebuild detected"
        );
        self.swap_build(desc)?;
        Ok(SiteAction::Swapped)
    }

    /// Replace a running worker with a new build.
    ///
    /// The new image is staged while the old worker still runs, so a failed
    /// deploy leaves the old worker in place.
    fn swap_build(&mut self, desc: &SiteDescriptor) -> Result<(), SupervisorError> {
        let source = self.source_fingerprint(desc)?;
        self.stage_build(desc, &source)?;
        self.suspect.remove(&desc.name);

        self.stop_site(&desc.name)?;
        self.start_site(desc)?;
        Ok(())
    }

    /// Restart a worker that died, rolling back and/or throttling per policy.
    fn recover_crash(
        &mut self,
        desc: &SiteDescriptor,
        record: &ProcessRecord,
    ) -> Result<(), SupervisorError> {
        // Uptime ends at the last pass that saw the worker alive
        let died_by = self
            .last_alive
            .remove(&desc.name)
            .filter(|seen| *seen >= record.started_at)
            .unwrap_or(record.started_at);
        let uptime = (died_by - record.started_at).to_std().unwrap_or_default();
        let decision = self.config.restart.on_crash(uptime);

        tracing::warn!(
            site = %desc.name,
            pid = record.pid,
            uptime_ms = uptime.as_millis() as u64,
            rollback = decision.rollback,
            throttled = decision.throttle.is_some(),
            "worker crashed"
        );

        self.children.remove(&desc.name);
        self.store.remove_process(&desc.name)?;

        if decision.rollback {
            self.roll_back(desc, record);
        }

        if let Some(delay) = decision.throttle {
            tracing::info!(site = %desc.name, delay_ms = delay.as_millis() as u64, "throttling restart");
            if !self.control.pause(delay) {
                tracing::info!(site = %desc.name, "shutdown during throttle, not restarting");
                return Ok(());
            }
        }

        self.start_site(desc)?;
        Ok(())
    }

    /// Restore the rollback image into the run slot. Falls back to a plain
    /// restart when no rollback image exists.
    fn roll_back(&mut self, desc: &SiteDescriptor, record: &ProcessRecord) {
        match self.slots(&desc.name).restore() {
            Ok(Some(restored)) => {
                if restored != record.fingerprint {
                    self.suspect
                        .insert(desc.name.clone(), record.fingerprint.clone());
                    tracing::warn!(
                        site = %desc.name,
                        bad = %record.fingerprint,
                        restored = %restored,
                        "rolled back to previous image"
                    );
                }
            }
            Ok(None) => {
                let e = SupervisorError::RollbackUnavailable {
                    site: desc.name.clone(),
                };
                tracing::warn!(error = %e, "falling back to plain restart");
            }
            Err(source) => {
                tracing::warn!(site = %desc.name, error = %source, "rollback restore failed, falling back to plain restart");
            }
        }
    }

    /// Drain the restart queue and stop-then-start every resolvable site.
    ///
    /// Returns whether any request was processed.
    pub fn process_restart_queue(&mut self) -> Result<bool, SupervisorError> {
        let requested = self.store.drain_restart_queue()?;
        if requested.is_empty() {
            return Ok(false);
        }

        let discovery = self.discovery.discover()?;
        for site in requested {
            let Some(desc) = discovery.find(&site) else {
                let path = discovery
                    .missing
                    .iter()
                    .find(|(name, _)| *name == site)
                    .map(|(_, path)| path.clone())
                    .unwrap_or_else(|| PathBuf::from("<unknown site>"));
                let e = SupervisorError::BinaryNotFound { site, path };
                tracing::error!(error = %e, "cannot restart");
                continue;
            };

            tracing::info!(site = %site, "restart requested");
            self.stop_site(&site)?;
            match self.start_site(desc) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::error!(site = %site, error = %e, "requested restart failed"),
            }
        }
        Ok(true)
    }

    /// Probe every running worker past its grace period and restart the
    /// unhealthy ones.
    ///
    /// Returns whether any worker was restarted.
    pub fn health_check(&mut self) -> Result<bool, SupervisorError> {
        let discovery = self.discovery.discover()?;
        let mut restarted = false;

        for desc in &discovery.desired {
            let Some(record) = self.store.get_process(&desc.name)? else {
                continue;
            };
            // Dead workers are the reconcile pass's business
            if !self.is_alive(&record) {
                continue;
            }
            let uptime = (Utc::now() - record.started_at)
                .to_std()
                .unwrap_or_default();
            if uptime < self.config.health.grace {
                continue;
            }
            let Some(port) = desc.port else {
                continue;
            };

            if let Err(e) = self.health.probe(&desc.name, port) {
                tracing::warn!(site = %desc.name, port, error = %e, "health check failed, restarting");
                self.stop_site(&desc.name)?;
                match self.start_site(desc) {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => tracing::error!(site = %desc.name, error = %e, "restart after failed health check failed"),
                }
                restarted = true;
            }
        }

        Ok(restarted)
    }

    /// Log each site whose binary is missing once, until it shows up again.
    fn report_missing(&mut self, missing: &[(String, PathBuf)]) {
        let now_missing: HashSet<&str> = missing.iter().map(|(name, _)| name.as_str()).collect();
        self.reported_missing
            .retain(|name| now_missing.contains(name.as_str()));

        for (site, path) in missing {
            if self.reported_missing.insert(site.clone()) {
                let e = SupervisorError::BinaryNotFound {
                    site: site.clone(),
                    path: path.clone(),
                };
                tracing::warn!(error = %e, "skipping site");
            }
        }
    }
}
