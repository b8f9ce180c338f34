//! Change notifier and supervisor working on the same store

use serial_test::serial;

use keeper::commands::scan::scan_sites;
use keeper::control::Control;
use keeper::process::is_process_alive;
use keeper::store::SiteKind;

use super::helpers::*;

#[test]
#[serial]
fn test_scanned_sites_are_started_on_their_ports() {
    let ws = Workspace::new();
    ws.add_dynamic_site("api", SLEEPER);
    ws.add_dynamic_site("blog", SLEEPER);
    ws.add_static_site("docs");

    let store = ws.store();
    let report = scan_sites(&store, ws.sites_root(), "Cargo.toml").expect("scan failed");
    assert_eq!(report.dynamic.len(), 2);

    let mut sup = ws.supervisor(Control::new());
    assert!(sup.reconcile().expect("reconcile failed"));

    let api = store.get_process("api").unwrap().expect("api not started");
    let blog = store.get_process("blog").unwrap().expect("blog not started");
    assert!(is_process_alive(api.pid));
    assert!(is_process_alive(blog.pid));
    assert!(store.get_process("docs").unwrap().is_none());
    assert_eq!(store.get_site("api").unwrap().unwrap().port, Some(8000));
    assert_eq!(store.get_site("blog").unwrap().unwrap().port, Some(8001));

    sup.stop_all().unwrap();
}

#[test]
#[serial]
fn test_removed_site_is_stopped_and_new_site_gets_fresh_port() {
    let ws = Workspace::new();
    ws.add_dynamic_site("api", SLEEPER);
    ws.add_dynamic_site("blog", SLEEPER);

    let store = ws.store();
    scan_sites(&store, ws.sites_root(), "Cargo.toml").unwrap();
    let mut sup = ws.supervisor(Control::new());
    sup.reconcile().unwrap();
    let api_pid = store.get_process("api").unwrap().unwrap().pid;

    ws.remove_site("api");
    ws.add_dynamic_site("shop", SLEEPER);
    let report = scan_sites(&store, ws.sites_root(), "Cargo.toml").unwrap();
    assert_eq!(report.pruned, vec!["api".to_string()]);

    assert!(sup.reconcile().unwrap());
    assert!(!is_process_alive(api_pid));
    assert!(store.get_process("api").unwrap().is_none());

    let shop = store.get_site("shop").unwrap().unwrap();
    assert_eq!(shop.kind, SiteKind::Dynamic);
    assert_eq!(shop.port, Some(8002));
    assert!(store.get_process("shop").unwrap().is_some());

    sup.stop_all().unwrap();
}

#[test]
#[serial]
fn test_site_turning_static_is_stopped() {
    let ws = Workspace::new();
    ws.add_dynamic_site("api", SLEEPER);

    let store = ws.store();
    scan_sites(&store, ws.sites_root(), "Cargo.toml").unwrap();
    let mut sup = ws.supervisor(Control::new());
    sup.reconcile().unwrap();
    let pid = store.get_process("api").unwrap().unwrap().pid;

    std::fs::remove_file(ws.sites_root().join("api").join("Cargo.toml")).unwrap();
    scan_sites(&store, ws.sites_root(), "Cargo.toml").unwrap();

    assert!(sup.reconcile().unwrap());
    assert!(!is_process_alive(pid));
    // The port stays reserved for the site
    assert_eq!(store.get_site("api").unwrap().unwrap().port, Some(8000));
}
