use anyhow::Result;
use clap::{Parser, Subcommand};
use keeper::commands::{import_legacy, rescan, restart, run, scan, status};
use keeper::config::KeeperConfig;
use keeper::logging;
use keeper::validation::clap_site_validator;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Local process supervisor for rebuildable worker sites", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to keeper.toml (default: <config dir>/keeper/keeper.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor in the foreground
    Run,

    /// Classify site directories, update the state store and signal a rescan
    Scan,

    /// Ask the running supervisor to reconcile now
    Rescan,

    /// Queue a restart of one site
    Restart {
        /// Site name (alphanumeric, dash, underscore only; max 128 characters)
        #[arg(value_parser = clap_site_validator)]
        site: String,
    },

    /// Show sites, ports and running workers
    Status,

    /// Import a legacy `<site> <port>` file into the state store
    ImportLegacy {
        /// Path to the legacy port file
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = KeeperConfig::load(cli.config.as_deref())?;

    // `run` installs its own subscriber with a file layer
    if !matches!(cli.command, Commands::Run) {
        logging::init(None)?;
    }

    match cli.command {
        Commands::Run => run::execute(&config),
        Commands::Scan => scan::execute(&config),
        Commands::Rescan => rescan::execute(&config),
        Commands::Restart { site } => restart::execute(&config, &site),
        Commands::Status => status::execute(&config),
        Commands::ImportLegacy { path } => import_legacy::execute(&config, &path),
    }
}
