//! Import-legacy command - one-time migration of a flat port file
//!
//! The legacy file holds one `<site> <port>` pair per line. Blank lines and
//! lines starting with `#` are ignored. Every imported site is dynamic.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use super::open_store;
use crate::config::KeeperConfig;
use crate::store::{SiteKind, StateStore, StoreError};
use crate::validation::validate_site_name;

/// Result of importing one file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<(String, u16)>,
    /// Entries left untouched because the site is already in the store
    pub existing: Vec<String>,
}

/// Parse legacy port file content. Fails on the first malformed line.
pub fn parse_legacy(content: &str) -> Result<Vec<(String, u16)>> {
    let mut entries = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lineno = idx + 1;
        let mut fields = line.split_whitespace();
        let (Some(name), Some(port), None) = (fields.next(), fields.next(), fields.next()) else {
            bail!("line {lineno}: expected `<site> <port>`, got '{line}'");
        };
        validate_site_name(name).with_context(|| format!("line {lineno}"))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("line {lineno}: invalid port '{port}'"))?;
        if port == 0 {
            bail!("line {lineno}: port must be non-zero");
        }
        entries.push((name.to_string(), port));
    }
    Ok(entries)
}

/// Insert parsed entries into the store.
///
/// Sites already present are reported and skipped, so running the import
/// twice is harmless. A port owned by a different site is an error.
pub fn import_entries(store: &StateStore, entries: &[(String, u16)]) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for (name, port) in entries {
        match store.import_site(name, SiteKind::Dynamic, *port) {
            Ok(()) => {
                tracing::info!(site = %name, port, "imported legacy site");
                report.imported.push((name.clone(), *port));
            }
            Err(StoreError::SiteExists(_)) => report.existing.push(name.clone()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to import '{name}' on port {port}"));
            }
        }
    }
    Ok(report)
}

pub fn execute(config: &KeeperConfig, path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read legacy port file: {}", path.display()))?;
    let entries = parse_legacy(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let store = open_store(config)?;
    let report = import_entries(&store, &entries)?;

    for (name, port) in &report.imported {
        println!("  {} {name} {}", "+".green(), format!(":{port}").dimmed());
    }
    for name in &report.existing {
        println!("  {} {name} {}", "─".dimmed(), "(already present)".dimmed());
    }
    println!(
        "{} Imported {} site(s)",
        "✓".green().bold(),
        report.imported.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "# legacy ports\n\napi 8000\n  blog   8003  \n";
        let entries = parse_legacy(content).unwrap();
        assert_eq!(
            entries,
            vec![("api".to_string(), 8000), ("blog".to_string(), 8003)]
        );
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_legacy("api\n").is_err());
        assert!(parse_legacy("api 8000 extra\n").is_err());
        assert!(parse_legacy("api port\n").is_err());
        assert!(parse_legacy("api 70000\n").is_err());
        assert!(parse_legacy("api 0\n").is_err());
        assert!(parse_legacy("../etc 8000\n").is_err());
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let err = parse_legacy("api 8000\nblog nope\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_import_is_repeatable() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::open(temp.path(), StoreOptions::default()).unwrap();
        let entries = parse_legacy("api 8005\nblog 8002\n").unwrap();

        let first = import_entries(&store, &entries).unwrap();
        assert_eq!(first.imported.len(), 2);

        let second = import_entries(&store, &entries).unwrap();
        assert!(second.imported.is_empty());
        assert_eq!(second.existing, vec!["api".to_string(), "blog".to_string()]);

        // New sites continue above the highest imported port
        assert_eq!(store.upsert_site("shop", SiteKind::Dynamic).unwrap(), Some(8006));
    }

    #[test]
    fn test_import_rejects_port_collision() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::open(temp.path(), StoreOptions::default()).unwrap();
        store.upsert_site("api", SiteKind::Dynamic).unwrap();

        let entries = vec![("blog".to_string(), 8000)];
        assert!(import_entries(&store, &entries).is_err());
    }
}
