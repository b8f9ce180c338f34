//! Starting, stopping and probing individual workers.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use super::core::Supervisor;
use super::error::SupervisorError;
use super::slots::SiteSlots;
use crate::discovery::{DiscoverySource, SiteDescriptor};
use crate::fingerprint::Fingerprint;
use crate::process::{is_process_alive, stop_child, terminate_pid};
use crate::store::ProcessRecord;

/// Extra spawn attempts when the freshly copied image is still busy.
const SPAWN_RETRIES: u32 = 3;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

impl<D: DiscoverySource> Supervisor<D> {
    pub(super) fn slots(&self, site: &str) -> SiteSlots {
        SiteSlots::new(&self.config.run_dir, site)
    }

    /// Fingerprint of the site's build output.
    pub(super) fn source_fingerprint(
        &self,
        desc: &SiteDescriptor,
    ) -> Result<Fingerprint, SupervisorError> {
        Fingerprint::of(&desc.binary, self.config.fingerprint_mode).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                SupervisorError::BinaryNotFound {
                    site: desc.name.clone(),
                    path: desc.binary.clone(),
                }
            } else {
                SupervisorError::DeployFailed {
                    site: desc.name.clone(),
                    source,
                }
            }
        })
    }

    /// Whether the process behind `record` is still running.
    ///
    /// Owned children are checked (and reaped) through their handle; adopted
    /// records fall back to probing the stored PID. A positive answer is
    /// remembered as the worker's last-seen-alive time.
    pub(super) fn is_alive(&mut self, record: &ProcessRecord) -> bool {
        let alive = if let Some(child) = self.children.get_mut(&record.site) {
            match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    tracing::info!(site = %record.site, pid = record.pid, %status, "worker exited");
                    false
                }
                Err(e) => {
                    tracing::warn!(site = %record.site, pid = record.pid, error = %e, "failed to poll worker");
                    false
                }
            }
        } else {
            record.pid != 0 && is_process_alive(record.pid)
        };

        if alive {
            self.last_alive.insert(record.site.clone(), Utc::now());
        } else {
            self.children.remove(&record.site);
        }
        alive
    }

    /// Deploy the site's build if needed and launch it from the run slot.
    pub fn start_site(&mut self, desc: &SiteDescriptor) -> Result<ProcessRecord, SupervisorError> {
        let port = self.ensure_port(desc)?;
        let fingerprint = self.prepare_run_slot(desc)?;
        let slots = self.slots(&desc.name);

        match self.spawn_worker(&desc.name, slots.run_path(), port) {
            Ok(child) => {
                let pid = child.id();
                self.children.insert(desc.name.clone(), child);
                self.failed_starts.remove(&desc.name);
                self.last_alive.remove(&desc.name);
                let record = self.store.save_process(&desc.name, pid, &fingerprint)?;
                tracing::info!(site = %desc.name, pid, port, %fingerprint, "worker started");
                Ok(record)
            }
            Err(source) => {
                self.failed_starts.insert(
                    desc.name.clone(),
                    ProcessRecord {
                        site: desc.name.clone(),
                        pid: 0,
                        fingerprint,
                        started_at: Utc::now(),
                    },
                );
                Err(SupervisorError::StartFailed {
                    site: desc.name.clone(),
                    source,
                })
            }
        }
    }

    /// Stop a site's worker and drop its record.
    ///
    /// The record is removed however the worker ended, including when it was
    /// already gone.
    pub fn stop_site(&mut self, site: &str) -> Result<(), SupervisorError> {
        let timeout = self.config.restart.stop_timeout;

        if let Some(mut child) = self.children.remove(site) {
            let pid = child.id();
            match stop_child(&mut child, timeout) {
                Ok(outcome) => tracing::info!(site, pid, ?outcome, "worker stopped"),
                Err(e) => tracing::warn!(site, pid, error = %e, "failed to stop worker"),
            }
        } else if let Some(record) = self.store.get_process(site)? {
            if record.pid != 0 {
                let outcome = terminate_pid(record.pid, timeout);
                tracing::info!(site, pid = record.pid, ?outcome, "adopted worker stopped");
            }
        }

        self.failed_starts.remove(site);
        self.last_alive.remove(site);
        self.store.remove_process(site)?;
        Ok(())
    }

    /// Port from the descriptor, or a freshly assigned one.
    fn ensure_port(&self, desc: &SiteDescriptor) -> Result<u16, SupervisorError> {
        if let Some(port) = desc.port {
            return Ok(port);
        }
        self.store
            .upsert_site(&desc.name, desc.kind)?
            .ok_or_else(|| SupervisorError::StartFailed {
                site: desc.name.clone(),
                source: io::Error::other("no port assigned"),
            })
    }

    /// Make sure the run slot holds the image to start and return its
    /// fingerprint.
    ///
    /// The build output is copied only when it differs from what is deployed.
    /// A build marked suspect after a rollback is never redeployed while a
    /// previous image is available.
    fn prepare_run_slot(&self, desc: &SiteDescriptor) -> Result<Fingerprint, SupervisorError> {
        let slots = self.slots(&desc.name);
        let source = self.source_fingerprint(desc)?;
        let deployed = slots
            .deployed_fingerprint()
            .map_err(|source| SupervisorError::DeployFailed {
                site: desc.name.clone(),
                source,
            })?;

        if self.suspect.get(&desc.name) == Some(&source) {
            if let Some(deployed) = deployed {
                tracing::debug!(site = %desc.name, %source, "keeping rolled-back image");
                return Ok(deployed);
            }
        }

        if deployed.as_ref() != Some(&source) {
            self.stage_build(desc, &source)?;
        }
        Ok(source)
    }

    /// Back up the run slot, then copy the build output over it.
    ///
    /// Every path that replaces the deployed image goes through here, so the
    /// rollback slot always holds the image that ran last.
    pub(super) fn stage_build(
        &self,
        desc: &SiteDescriptor,
        source: &Fingerprint,
    ) -> Result<(), SupervisorError> {
        let deploy_failed = |source: io::Error| SupervisorError::DeployFailed {
            site: desc.name.clone(),
            source,
        };

        let slots = self.slots(&desc.name);
        if let Some(backed_up) = slots.backup().map_err(deploy_failed)? {
            tracing::debug!(site = %desc.name, fingerprint = %backed_up, "backed up running image");
        }
        slots.deploy(&desc.binary, source).map_err(deploy_failed)?;
        tracing::debug!(site = %desc.name, fingerprint = %source, "deployed build to run slot");
        Ok(())
    }

    fn spawn_worker(&self, site: &str, image: &Path, port: u16) -> io::Result<Child> {
        fs::create_dir_all(&self.config.logs_dir)?;
        let log_path = self.config.logs_dir.join(format!("{site}.log"));
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        writeln!(
            log,
            "--- keeper: starting {site} on port {port} at {} ---",
            Utc::now().to_rfc3339()
        )?;
        let stderr = log.try_clone()?;

        let mut cmd = Command::new(image);
        if let Some(arg) = &self.config.port_arg {
            cmd.arg(arg).arg(port.to_string());
        }
        if let Some(var) = &self.config.port_env {
            cmd.env(var, port.to_string());
        }
        // Own process group: a Ctrl-C aimed at the supervisor must not reach
        // workers before the supervisor stops them
        cmd.stdin(Stdio::null())
            .stdout(log)
            .stderr(stderr)
            .process_group(0);

        let mut attempt = 0;
        loop {
            match cmd.spawn() {
                Ok(child) => return Ok(child),
                Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < SPAWN_RETRIES => {
                    attempt += 1;
                    thread::sleep(SPAWN_RETRY_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
