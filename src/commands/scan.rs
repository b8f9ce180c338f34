//! Scan command - the change notifier
//!
//! Classifies every directory under the sites root, records the result in the
//! state store, drops sites whose directory is gone, and asks a running
//! supervisor to rescan.

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::open_store;
use crate::config::KeeperConfig;
use crate::control::notify_rescan;
use crate::store::{SiteKind, StateStore};
use crate::validation::validate_site_name;

/// Outcome of one scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Dynamic sites with their assigned port
    pub dynamic: Vec<(String, u16)>,
    pub static_sites: Vec<String>,
    /// Sites removed from the store
    pub pruned: Vec<String>,
    /// Directories whose name is not a valid site name
    pub skipped: Vec<String>,
}

/// Classify the site directories under `sites_root` and sync the store.
///
/// A directory containing `marker` is a dynamic site, any other directory a
/// static one. Hidden directories are ignored.
pub fn scan_sites(store: &StateStore, sites_root: &Path, marker: &str) -> Result<ScanReport> {
    let entries = fs::read_dir(sites_root)
        .with_context(|| format!("Failed to read sites root: {}", sites_root.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read sites root entry")?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push((name, entry.path()));
    }
    names.sort();

    let mut report = ScanReport::default();
    let mut keep = HashSet::new();

    for (name, path) in names {
        if let Err(e) = validate_site_name(&name) {
            tracing::warn!(dir = %path.display(), error = %e, "skipping directory");
            report.skipped.push(name);
            continue;
        }

        let kind = if path.join(marker).exists() {
            SiteKind::Dynamic
        } else {
            SiteKind::Static
        };
        let port = store.upsert_site(&name, kind)?;
        match (kind, port) {
            (SiteKind::Dynamic, Some(port)) => report.dynamic.push((name.clone(), port)),
            _ => report.static_sites.push(name.clone()),
        }
        keep.insert(name);
    }

    report.pruned = store.prune_sites(&keep)?;
    for name in &report.pruned {
        tracing::info!(site = %name, "site removed");
    }

    Ok(report)
}

/// Scan, then signal the supervisor.
pub fn execute(config: &KeeperConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = scan_sites(&store, &config.sites_root, &config.dynamic_marker)?;

    println!(
        "{} Scanned {}",
        "→".cyan().bold(),
        config.sites_root.display()
    );
    for (name, port) in &report.dynamic {
        println!("  {} {name} {}", "●".green(), format!(":{port}").dimmed());
    }
    for name in &report.static_sites {
        println!("  {} {name} {}", "○".dimmed(), "(static)".dimmed());
    }
    for name in &report.pruned {
        println!("  {} {name} {}", "✗".red(), "(removed)".dimmed());
    }
    for name in &report.skipped {
        println!("  {} {name} {}", "!".yellow(), "(invalid name, skipped)".dimmed());
    }

    if notify_rescan(&store)? {
        println!("{} Supervisor notified", "✓".green().bold());
    } else {
        println!("{} Supervisor is not running", "─".dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StateStore) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::open(&temp.path().join("state"), StoreOptions::default())
            .expect("Failed to open store");
        fs::create_dir_all(temp.path().join("sites")).unwrap();
        (temp, store)
    }

    fn add_site(root: &Path, name: &str, dynamic: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if dynamic {
            fs::write(dir.join("Cargo.toml"), "[package]\n").unwrap();
        }
    }

    #[test]
    fn test_classifies_by_marker() {
        let (temp, store) = setup();
        let root = temp.path().join("sites");
        add_site(&root, "api", true);
        add_site(&root, "blog", true);
        add_site(&root, "docs", false);
        fs::write(root.join("README"), "not a site").unwrap();

        let report = scan_sites(&store, &root, "Cargo.toml").unwrap();

        assert_eq!(
            report.dynamic,
            vec![("api".to_string(), 8000), ("blog".to_string(), 8001)]
        );
        assert_eq!(report.static_sites, vec!["docs".to_string()]);
        assert_eq!(store.get_site("docs").unwrap().unwrap().kind, SiteKind::Static);
    }

    #[test]
    fn test_rescan_keeps_ports_and_prunes_removed() {
        let (temp, store) = setup();
        let root = temp.path().join("sites");
        add_site(&root, "api", true);
        add_site(&root, "blog", true);
        scan_sites(&store, &root, "Cargo.toml").unwrap();

        fs::remove_dir_all(root.join("api")).unwrap();
        add_site(&root, "shop", true);
        let report = scan_sites(&store, &root, "Cargo.toml").unwrap();

        assert_eq!(report.pruned, vec!["api".to_string()]);
        assert_eq!(
            report.dynamic,
            vec![("blog".to_string(), 8001), ("shop".to_string(), 8002)]
        );
        assert!(store.get_site("api").unwrap().is_none());
    }

    #[test]
    fn test_skips_hidden_and_invalid_names() {
        let (temp, store) = setup();
        let root = temp.path().join("sites");
        add_site(&root, ".git", true);
        add_site(&root, "bad name", true);
        add_site(&root, "api", true);

        let report = scan_sites(&store, &root, "Cargo.toml").unwrap();

        assert_eq!(report.dynamic.len(), 1);
        assert_eq!(report.skipped, vec!["bad name".to_string()]);
        assert_eq!(store.list_sites().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let (temp, store) = setup();
        let result = scan_sites(&store, &temp.path().join("nowhere"), "Cargo.toml");
        assert!(result.is_err());
    }
}
