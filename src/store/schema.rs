//! Records held by the state store and the on-disk document layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::fingerprint::Fingerprint;

/// Current on-disk document version.
pub const SCHEMA_VERSION: u32 = 1;

/// Whether a site is served by a long-running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    /// Plain files, nothing to supervise
    Static,
    /// Backed by a worker binary that needs a port
    Dynamic,
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteKind::Static => f.write_str("static"),
            SiteKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A classified site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub kind: SiteKind,
    pub port: Option<u16>,
}

/// A child process the supervisor believes is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub site: String,
    pub pid: u32,
    pub fingerprint: Fingerprint,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SiteRow {
    pub kind: SiteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ProcessRow {
    pub pid: u32,
    pub fingerprint: Fingerprint,
    pub started_at: DateTime<Utc>,
}

/// The whole persisted state. Tables are keyed by site name (or config key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Document {
    pub version: u32,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteRow>,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessRow>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_queue: BTreeMap<String, DateTime<Utc>>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            sites: BTreeMap::new(),
            processes: BTreeMap::new(),
            config: BTreeMap::new(),
            restart_queue: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Highest port currently assigned to any site.
    pub fn max_assigned_port(&self) -> Option<u16> {
        self.sites.values().filter_map(|s| s.port).max()
    }

    /// Site that owns `port`, if any.
    pub fn port_owner(&self, port: u16) -> Option<&str> {
        self.sites
            .iter()
            .find(|(_, row)| row.port == Some(port))
            .map(|(name, _)| name.as_str())
    }
}
