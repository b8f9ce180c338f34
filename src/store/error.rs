//! State store errors.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a state store operation.
///
/// Every variant is fatal to the operation that raised it; callers propagate
/// it instead of continuing with stale assumptions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state store busy: lock on {} not acquired within {waited:?}", path.display())]
    Busy { path: PathBuf, waited: Duration },

    #[error("state store document {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("site '{0}' already exists")]
    SiteExists(String),

    #[error("port {port} is already assigned to site '{site}'")]
    PortTaken { port: u16, site: String },

    #[error("no free port left above {0}")]
    PortsExhausted(u16),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
