//! Status command - sites, ports and running workers

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;

use super::open_store;
use crate::config::KeeperConfig;
use crate::control::registered_supervisor;
use crate::process::is_process_alive;
use crate::store::{SiteKind, StateStore};

/// One row of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteStatus {
    pub name: String,
    pub kind: SiteKind,
    pub port: Option<u16>,
    pub worker: Option<WorkerStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub pid: u32,
    pub alive: bool,
    pub started_at: DateTime<Utc>,
    pub fingerprint: String,
}

/// Read every site and its process record.
pub fn collect(store: &StateStore) -> Result<Vec<SiteStatus>> {
    let mut rows = Vec::new();
    for site in store.list_sites()? {
        let worker = store.get_process(&site.name)?.map(|record| WorkerStatus {
            pid: record.pid,
            alive: is_process_alive(record.pid),
            started_at: record.started_at,
            fingerprint: record.fingerprint.to_string(),
        });
        rows.push(SiteStatus {
            name: site.name,
            kind: site.kind,
            port: site.port,
            worker,
        });
    }
    Ok(rows)
}

fn format_uptime(started_at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - started_at).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m{}s", s / 60, s % 60),
        s => format!("{}h{}m", s / 3600, (s % 3600) / 60),
    }
}

pub fn execute(config: &KeeperConfig) -> Result<()> {
    let store = open_store(config)?;

    println!("{}", "keeper status".bold().blue());
    println!("{}", "=".repeat(50));

    match registered_supervisor(&store)? {
        Some(pid) if is_process_alive(pid) => {
            println!("{} Supervisor running (pid {pid})", "●".green().bold());
        }
        Some(pid) => {
            println!("{} Supervisor not running (stale pid {pid})", "○".yellow());
        }
        None => println!("{} Supervisor not running", "○".dimmed()),
    }

    let rows = collect(&store)?;
    if rows.is_empty() {
        println!("\n{}", "No sites recorded. Run `keeper scan` first.".dimmed());
        return Ok(());
    }

    println!("\n{}", "Sites".bold());
    for row in rows {
        let port = row
            .port
            .map(|p| format!(":{p}"))
            .unwrap_or_else(|| "-".to_string());
        let worker = match &row.worker {
            Some(w) if w.alive => format!(
                "{} pid {} up {}",
                "running".green(),
                w.pid,
                format_uptime(w.started_at)
            ),
            Some(w) => format!("{} pid {}", "dead".red(), w.pid),
            None if row.kind == SiteKind::Dynamic => "stopped".dimmed().to_string(),
            None => String::new(),
        };
        println!(
            "  {:<24} {:<8} {:<7} {worker}",
            row.name,
            row.kind.to_string(),
            port
        );
    }

    println!();
    Ok(())
}
