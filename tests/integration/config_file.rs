//! keeper.toml loading and the settings derived from it

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use keeper::config::KeeperConfig;
use keeper::fingerprint::FingerprintMode;

#[test]
fn test_config_file_drives_supervisor_settings() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let path = temp.path().join("keeper.toml");
    fs::write(
        &path,
        r#"
state_dir = "/srv/keeper"
sites_root = "/srv/sites"
fingerprint = "sha256"
port_arg = ""

[restart]
rollback_window_secs = 60
min_uptime_secs = 5

[health]
path = "/healthz"
grace_secs = 20
"#,
    )
    .unwrap();

    let config = KeeperConfig::load(Some(&path)).expect("Failed to load config");
    let sup = config.supervisor_config();

    assert_eq!(sup.run_dir, PathBuf::from("/srv/keeper/run"));
    assert_eq!(sup.logs_dir, PathBuf::from("/srv/keeper/logs"));
    assert_eq!(sup.fingerprint_mode, FingerprintMode::Sha256);
    assert_eq!(sup.port_env.as_deref(), Some("PORT"));
    assert_eq!(sup.port_arg, None);
    assert_eq!(sup.restart.rollback_window, Duration::from_secs(60));
    assert_eq!(sup.restart.min_uptime, Duration::from_secs(5));
    assert_eq!(sup.restart.stop_timeout, Duration::from_secs(5));
    assert_eq!(sup.health.path, "/healthz");
    assert_eq!(sup.health.grace, Duration::from_secs(20));
    assert_eq!(sup.poll.min, Duration::from_secs(2));
    assert_eq!(
        config.binary_path("api"),
        PathBuf::from("/srv/sites/api/target/release/api")
    );
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let path = temp.path().join("keeper.toml");
    fs::write(&path, "[poll]\nmin_secs = 10\nmax_secs = 5\n").unwrap();

    assert!(KeeperConfig::load(Some(&path)).is_err());
}
