pub mod commands;
pub mod config;
pub mod control;
pub mod discovery;
pub mod fingerprint;
pub mod logging;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod validation;
