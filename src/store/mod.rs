//! Durable state shared by every keeper process on the host.
//!
//! One JSON document under an advisory lock. Readers take a shared lock,
//! writers an exclusive one, and writes land via atomic rename.

mod core;
mod error;
mod locking;
mod schema;


pub use self::core::{
    StateStore, StoreOptions, DEFAULT_LOCK_TIMEOUT, DEFAULT_START_PORT, DOCUMENT_FILE, LOCK_FILE,
};
pub use error::StoreError;
pub use schema::{ProcessRecord, Site, SiteKind, SCHEMA_VERSION};

/// Config slot holding the running supervisor's PID.
pub const SUPERVISOR_PID_KEY: &str = "supervisor_pid";
