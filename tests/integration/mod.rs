//! Integration tests for keeper
//!
//! These tests drive the change notifier, the supervisor and the restart
//! requester against one shared state directory, the way the separate
//! processes do on a real host.

pub mod config_file;
pub mod helpers;
pub mod restart_flow;
pub mod scan_flow;
