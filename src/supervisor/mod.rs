//! The supervisor: keeps every dynamic site's worker running.
//!
//! Each pass discovers the desired sites, compares them with the process
//! records in the state store, and starts, stops or swaps workers to match.
//! Crashes are answered with a restart, optionally preceded by a rollback to
//! the previous image and a throttling pause.

mod child;
mod config;
mod core;
mod error;
mod health;
mod policy;
mod polling;
mod reconcile;
mod slots;


pub use self::config::SupervisorConfig;
pub use self::core::Supervisor;
pub use self::error::SupervisorError;
pub use self::health::{HealthChecker, HealthConfig};
pub use self::policy::{CrashDecision, RestartPolicy};
pub use self::polling::{PollConfig, PollInterval};
pub use self::slots::SiteSlots;
