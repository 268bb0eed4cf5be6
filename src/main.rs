// src/main.rs

//! propwatch: property-portal watcher CLI
//!
//! Watches configured portal searches, diffs each scrape against the
//! persisted property map and keeps one webhook notification per property
//! up to date.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use propwatch::error::{AppError, Result};
use propwatch::models::Config;
use propwatch::notify::{Notifier, WebhookNotifier};
use propwatch::pipeline::{run_cycle, run_sweep, run_watch};
use propwatch::services::ListingScraper;
use propwatch::storage::{LocalStore, PropertyStore};

#[derive(Parser, Debug)]
#[command(
    name = "propwatch",
    version,
    about = "Watches property-portal searches and keeps webhook alerts in sync"
)]

/// CLI Arguments
struct Cli {
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch all targets on the polling schedule until Ctrl-C
    Run,
    /// Run one scrape cycle and exit
    Cycle {
        /// Restrict to a single target id
        #[arg(long)]
        target: Option<String>,
    },
    /// Run the retention sweep and exit
    Sweep,
    /// Validate configuration
    Validate,
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Run => {
            config.validate()?;
            let config = Arc::new(config);
            let store: Arc<dyn PropertyStore> =
                Arc::new(LocalStore::new(&config.tracking.state_dir));
            let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new()?);
            run_watch(config, store, notifier).await?;
        }
        Command::Cycle { target } => {
            config.validate()?;
            let config = Arc::new(config);
            let store = LocalStore::new(&config.tracking.state_dir);
            let notifier = WebhookNotifier::new()?;
            let scraper = ListingScraper::new(Arc::clone(&config));

            let selected: Vec<_> = config
                .targets
                .iter()
                .filter(|t| target.as_ref().is_none_or(|id| *id == t.id))
                .collect();
            if selected.is_empty() {
                return Err(AppError::config(format!(
                    "No target matches '{}'",
                    target.unwrap_or_default()
                )));
            }

            for t in selected {
                if let Err(error) = run_cycle(&config, t, &scraper, &store, &notifier).await {
                    log::error!("Cycle failed for {}: {error}", t.display_name());
                }
            }
        }
        Command::Sweep => {
            config.validate()?;
            let store = LocalStore::new(&config.tracking.state_dir);
            let notifier = WebhookNotifier::new()?;
            for t in &config.targets {
                run_sweep(&config, t, &store, &notifier).await?;
            }
        }
        Command::Validate => {
            config.validate()?;
            log::info!(
                "Configuration OK: {} targets, {} active windows",
                config.targets.len(),
                config.schedule.active_windows.len()
            );
        }
    }

    Ok(())
}

/// Initialize env_logger, defaulting to info (warn with --quiet).
fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}
