//! gradewatch CLI
//!
//! Local execution entry point, meant to be run periodically (cron, systemd timer).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gradewatch::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, RunOptions},
    services::ExtractorRegistry,
    storage::{LocalSnapshotStore, SnapshotStore, StorageKey},
};

/// gradewatch - USOSweb grade watcher
#[derive(Parser, Debug)]
#[command(
    name = "gradewatch",
    version,
    about = "Notifies about new grades and test results on USOSweb"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the portal, compare with stored snapshots and notify
    Run {
        /// Store snapshots but send no notifications
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Print a stored snapshot (final-grades, exception, courses/<code>, compared)
    Show { key: String },

    /// List registered page extractors
    Extractors,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging; `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = if cli.verbose {
        "debug"
    } else {
        loaded
            .as_ref()
            .map(|c| c.logging.level.as_str())
            .unwrap_or("info")
    };
    init_logging(level);

    let config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {e}. Using defaults.",
                cli.config.display()
            );
            Config::default()
        }
    };

    match cli.command {
        Command::Run { dry_run } => {
            let report = pipeline::run_once(&config, RunOptions { dry_run }).await?;
            if report.analysis.dispatched && !report.analysis.delivered {
                log::warn!("Some notification channels did not deliver");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            let config = Config::load(&cli.config)?;
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Show { key } => {
            let store = LocalSnapshotStore::new(&config.storage.data_dir);
            if key.trim() == "compared" {
                let report = store
                    .load_report()
                    .await?
                    .ok_or_else(|| AppError::validation("No comparison report stored yet"))?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            let storage_key = StorageKey::parse(&key)
                .ok_or_else(|| AppError::validation(format!("Unknown snapshot key '{key}'")))?;
            match store.load(&storage_key).await? {
                Some(snapshot) => {
                    println!("{}", serde_json::to_string_pretty(&snapshot.into_entity())?);
                }
                None => log::info!(
                    "No snapshot stored at {}",
                    store.path_for(&storage_key).display()
                ),
            }
        }

        Command::Extractors => {
            for key in ExtractorRegistry::default().keys() {
                println!("{key}");
            }
        }

        Command::Init { force } => {
            if cli.config.exists() && !force {
                log::warn!(
                    "Configuration already exists at {}. Use --force to overwrite.",
                    cli.config.display()
                );
                return Ok(());
            }
            if let Some(parent) = cli.config.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&cli.config, Config::default().to_toml()?)?;
            log::info!("Default configuration written to {}", cli.config.display());
        }
    }

    Ok(())
}
