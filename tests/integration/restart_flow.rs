//! Restart requests and rescans delivered through real signals

use serial_test::serial;
use std::thread;
use std::time::Duration;

use keeper::control::{notify_rescan, request_restart, Control, RequestError};
use keeper::process::is_process_alive;
use keeper::store::SUPERVISOR_PID_KEY;

use super::helpers::*;

#[test]
#[serial]
fn test_restart_without_supervisor_is_rejected() {
    let ws = Workspace::new();
    let store = ws.store();

    let err = request_restart(&store, "api").unwrap_err();
    assert!(matches!(err, RequestError::NoSupervisor));
    assert!(store.drain_restart_queue().unwrap().is_empty());

    // Rescan without a supervisor is only a warning
    assert!(!notify_rescan(&store).unwrap());
}

#[test]
#[serial]
fn test_invalid_site_name_is_rejected() {
    let ws = Workspace::new();
    let err = request_restart(&ws.store(), "../etc").unwrap_err();
    assert!(matches!(err, RequestError::InvalidName(_)));
}

/// The only test in this binary that installs the process-wide handlers: the
/// shutdown flag stays set once requested.
#[test]
#[serial]
fn test_signalled_restart_and_shutdown() {
    let ws = Workspace::new();
    ws.add_dynamic_site("api", SLEEPER);
    let store = ws.store();
    keeper::commands::scan::scan_sites(&store, ws.sites_root(), "Cargo.toml").unwrap();

    let control = Control::install().expect("Failed to install signal handlers");
    let mut sup = ws.supervisor(control.clone());
    let runner = thread::spawn(move || sup.run());

    assert!(
        wait_until(Duration::from_secs(10), || {
            store.get_process("api").unwrap().is_some()
        }),
        "api was never started"
    );
    let first_pid = store.get_process("api").unwrap().unwrap().pid;
    assert_eq!(
        store.get_config(SUPERVISOR_PID_KEY).unwrap(),
        Some(std::process::id().to_string())
    );

    let signalled = request_restart(&store, "api").expect("restart request failed");
    assert_eq!(signalled, std::process::id());

    assert!(
        wait_until(Duration::from_secs(10), || {
            matches!(store.get_process("api").unwrap(), Some(r) if r.pid != first_pid)
        }),
        "api was not restarted"
    );
    assert!(!is_process_alive(first_pid));
    assert!(store.drain_restart_queue().unwrap().is_empty());

    assert!(notify_rescan(&store).unwrap());

    let last_pid = store.get_process("api").unwrap().unwrap().pid;
    control.request_shutdown();
    runner
        .join()
        .expect("supervisor thread panicked")
        .expect("supervisor failed");

    assert!(!is_process_alive(last_pid));
    assert!(store.get_process("api").unwrap().is_none());
    assert_eq!(store.get_config(SUPERVISOR_PID_KEY).unwrap(), None);
}
