//! The state store: site classification, ports, process records, config slots
//! and the restart queue, shared by every keeper process on the host.

use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use super::error::StoreError;
use super::locking::{LockMode, StoreLock};
use super::schema::{Document, ProcessRecord, ProcessRow, Site, SiteKind, SiteRow, SCHEMA_VERSION};
use crate::fingerprint::Fingerprint;

/// File name of the persisted document inside the state directory.
pub const DOCUMENT_FILE: &str = "keeper.json";

/// File name of the sidecar lock inside the state directory.
pub const LOCK_FILE: &str = "keeper.lock";

/// Default first port handed to a dynamic site.
pub const DEFAULT_START_PORT: u16 = 8000;

/// Default bound on waiting for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub start_port: u16,
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            start_port: DEFAULT_START_PORT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Handle to the durable state shared between the supervisor, the change
/// notifier and the restart requester.
///
/// The handle holds no lock. Each operation takes the lock, reads the document,
/// applies its change and releases the lock again, so any number of handles in
/// any number of processes can be open at once.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    document_path: PathBuf,
    lock_path: PathBuf,
    options: StoreOptions,
}

impl StateStore {
    /// Open (creating if needed) the store in `dir`.
    pub fn open(dir: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            document_path: dir.join(DOCUMENT_FILE),
            lock_path: dir.join(LOCK_FILE),
            options,
        })
    }

    /// Directory holding the store files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ---- sites ----

    /// Record a site's classification.
    ///
    /// A dynamic site without a port gets the next port above every port
    /// already handed out (never below the configured start port). An existing
    /// port is kept as-is, even if the kind changes, so a name always maps to
    /// the same port for as long as the site exists.
    pub fn upsert_site(&self, name: &str, kind: SiteKind) -> Result<Option<u16>, StoreError> {
        let start_port = self.options.start_port;
        self.update(|doc| {
            let existing_port = doc.sites.get(name).and_then(|row| row.port);
            let port = match (existing_port, kind) {
                (Some(port), _) => Some(port),
                (None, SiteKind::Dynamic) => Some(next_port(doc, start_port)?),
                (None, SiteKind::Static) => None,
            };
            doc.sites.insert(name.to_string(), SiteRow { kind, port });
            Ok(port)
        })?
    }

    /// Insert a site with an explicit port. Only used by the legacy import.
    pub fn import_site(&self, name: &str, kind: SiteKind, port: u16) -> Result<(), StoreError> {
        self.update(|doc| {
            if doc.sites.contains_key(name) {
                return Err(StoreError::SiteExists(name.to_string()));
            }
            if let Some(owner) = doc.port_owner(port) {
                return Err(StoreError::PortTaken {
                    port,
                    site: owner.to_string(),
                });
            }
            doc.sites.insert(
                name.to_string(),
                SiteRow {
                    kind,
                    port: Some(port),
                },
            );
            Ok(())
        })?
    }

    /// Delete every site not in `keep`, along with its process record and any
    /// pending restart request. Returns the removed names.
    pub fn prune_sites(&self, keep: &HashSet<String>) -> Result<Vec<String>, StoreError> {
        self.update(|doc| {
            let removed: Vec<String> = doc
                .sites
                .keys()
                .filter(|name| !keep.contains(*name))
                .cloned()
                .collect();
            for name in &removed {
                doc.sites.remove(name);
                doc.processes.remove(name);
                doc.restart_queue.remove(name);
            }
            removed
        })
    }

    pub fn get_site(&self, name: &str) -> Result<Option<Site>, StoreError> {
        let doc = self.read()?;
        Ok(doc.sites.get(name).map(|row| Site {
            name: name.to_string(),
            kind: row.kind,
            port: row.port,
        }))
    }

    /// All sites, ordered by name.
    pub fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let doc = self.read()?;
        Ok(doc
            .sites
            .into_iter()
            .map(|(name, row)| Site {
                name,
                kind: row.kind,
                port: row.port,
            })
            .collect())
    }

    // ---- processes ----

    /// Record a freshly started process, stamped with the current time.
    pub fn save_process(
        &self,
        name: &str,
        pid: u32,
        fingerprint: &Fingerprint,
    ) -> Result<ProcessRecord, StoreError> {
        let started_at = Utc::now();
        self.update(|doc| {
            doc.processes.insert(
                name.to_string(),
                ProcessRow {
                    pid,
                    fingerprint: fingerprint.clone(),
                    started_at,
                },
            );
        })?;
        Ok(ProcessRecord {
            site: name.to_string(),
            pid,
            fingerprint: fingerprint.clone(),
            started_at,
        })
    }

    /// Remove a process record. Returns whether one existed.
    pub fn remove_process(&self, name: &str) -> Result<bool, StoreError> {
        self.update(|doc| doc.processes.remove(name).is_some())
    }

    pub fn get_process(&self, name: &str) -> Result<Option<ProcessRecord>, StoreError> {
        let doc = self.read()?;
        Ok(doc.processes.get(name).map(|row| ProcessRecord {
            site: name.to_string(),
            pid: row.pid,
            fingerprint: row.fingerprint.clone(),
            started_at: row.started_at,
        }))
    }

    /// Names of all sites with a process record, ordered by name.
    pub fn list_tracked_processes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read()?.processes.into_keys().collect())
    }

    // ---- config slots ----

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.config.insert(key.to_string(), value.to_string());
        })
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.config.remove(key))
    }

    pub fn clear_config(&self, key: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.config.remove(key);
        })
    }

    // ---- restart queue ----

    /// Queue a restart for `name`. Re-queuing bumps the request time.
    pub fn queue_restart(&self, name: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        self.update(|doc| {
            doc.restart_queue.insert(name.to_string(), now);
        })
    }

    /// Remove and return every pending restart, oldest request first.
    pub fn drain_restart_queue(&self) -> Result<Vec<String>, StoreError> {
        self.update(|doc| {
            let mut pending: Vec<_> = std::mem::take(&mut doc.restart_queue)
                .into_iter()
                .collect();
            pending.sort_by(|(a_name, a_at), (b_name, b_at)| {
                a_at.cmp(b_at).then_with(|| a_name.cmp(b_name))
            });
            pending.into_iter().map(|(name, _)| name).collect()
        })
    }

    // ---- document access ----

    fn read(&self) -> Result<Document, StoreError> {
        let _lock = StoreLock::acquire(&self.lock_path, LockMode::Shared, self.options.lock_timeout)?;
        self.load()
    }

    /// Run `f` against the document under the exclusive lock and persist the
    /// result. Nothing is written when `f` leaves the document unchanged.
    fn update<T>(&self, f: impl FnOnce(&mut Document) -> T) -> Result<T, StoreError> {
        let _lock = StoreLock::acquire(
            &self.lock_path,
            LockMode::Exclusive,
            self.options.lock_timeout,
        )?;
        let mut doc = self.load()?;
        let before = doc.clone();
        let result = f(&mut doc);
        if doc != before {
            self.persist(&doc)?;
        }
        Ok(result)
    }

    fn load(&self) -> Result<Document, StoreError> {
        let content = match fs::read_to_string(&self.document_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(StoreError::io(&self.document_path, e)),
        };

        let doc: Document =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.document_path.clone(),
                source,
            })?;

        if doc.version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: doc.version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(doc)
    }

    /// Write to a temp file in the same directory, then rename over the
    /// document so readers only ever see complete states.
    fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Corrupt {
            path: self.document_path.clone(),
            source,
        })?;

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        temp.write_all(&json)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| StoreError::io(temp.path(), e))?;
        temp.persist(&self.document_path)
            .map_err(|e| StoreError::io(&self.document_path, e.error))?;
        Ok(())
    }
}

fn next_port(doc: &Document, start_port: u16) -> Result<u16, StoreError> {
    let floor = start_port.saturating_sub(1);
    let highest = doc.max_assigned_port().map_or(floor, |p| p.max(floor));
    highest
        .checked_add(1)
        .ok_or(StoreError::PortsExhausted(highest))
}
