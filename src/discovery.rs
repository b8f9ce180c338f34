//! Where the supervisor learns which workers should be running.
//!
//! The supervisor only sees [`SiteDescriptor`]s handed out by a
//! [`DiscoverySource`]; it never scans directories itself.

use std::path::PathBuf;

use crate::store::{SiteKind, StateStore, StoreError};

/// One worker the supervisor should keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDescriptor {
    pub name: String,
    pub kind: SiteKind,
    /// Assigned port, if the classifier already assigned one
    pub port: Option<u16>,
    /// Build output the run slot is deployed from
    pub binary: PathBuf,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Dynamic sites with a built binary on disk
    pub desired: Vec<SiteDescriptor>,
    /// Dynamic sites whose binary could not be found, with the path tried
    pub missing: Vec<(String, PathBuf)>,
}

impl Discovery {
    pub fn find(&self, name: &str) -> Option<&SiteDescriptor> {
        self.desired.iter().find(|d| d.name == name)
    }
}

/// A pluggable producer of desired sites.
pub trait DiscoverySource {
    fn discover(&self) -> Result<Discovery, StoreError>;
}

/// Discovery backed by the classification in the state store.
///
/// Every dynamic site is desired as long as its binary exists at the path
/// produced by the resolver.
pub struct StoreDiscovery {
    store: StateStore,
    resolve: Box<dyn Fn(&str) -> PathBuf + Send>,
}

impl StoreDiscovery {
    pub fn new(store: StateStore, resolve: impl Fn(&str) -> PathBuf + Send + 'static) -> Self {
        Self {
            store,
            resolve: Box::new(resolve),
        }
    }
}

impl DiscoverySource for StoreDiscovery {
    fn discover(&self) -> Result<Discovery, StoreError> {
        let mut discovery = Discovery::default();

        for site in self.store.list_sites()? {
            if site.kind != SiteKind::Dynamic {
                continue;
            }
            let binary = (self.resolve)(&site.name);
            if binary.is_file() {
                discovery.desired.push(SiteDescriptor {
                    name: site.name,
                    kind: site.kind,
                    port: site.port,
                    binary,
                });
            } else {
                discovery.missing.push((site.name, binary));
            }
        }

        Ok(discovery)
    }
}
