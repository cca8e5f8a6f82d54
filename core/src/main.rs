use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mediacore::{
    cli::{Cli, Command},
    config::Config,
    model::backend_registry,
    services::{
        storage::LocalStorage,
        timer::{spawn_schedule, CleanJob},
    },
    SqliteCatalogue,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.global)?;
    let level = if cfg.logging_enabled { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Fields => {
            let registry = backend_registry();
            println!("{}", serde_json::to_string_pretty(registry.record_types())?);
        }
        Command::Clean { top, dry_run, json } => {
            let job = open_job(&cfg)?.with_top(top);
            let report = job.run_blocking(dry_run).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.deletable.is_empty() {
                println!("No unused media files detected.");
            } else if dry_run {
                println!("{} unused media file(s) would be removed:", report.deletable.len());
                for file in &report.deletable {
                    println!("  {}", file);
                }
            } else {
                println!("Removed {} unused media file(s).", report.outcome.deleted);
                if report.outcome.not_found > 0 {
                    println!(
                        "{} unused media file(s) failed to be deleted.",
                        report.outcome.not_found
                    );
                }
            }
        }
        Command::Schedule { top, every } => {
            let every = every.map(Duration::from_secs).unwrap_or(cfg.clean_interval);
            if every.is_zero() {
                anyhow::bail!("invalid_interval");
            }
            let handle = spawn_schedule(open_job(&cfg)?.with_top(top), every);
            info!(
                "cleaning {} every {}s - press Ctrl+C to exit",
                cfg.media_root.display(),
                every.as_secs()
            );
            tokio::signal::ctrl_c().await?;
            handle.abort();
        }
    }
    Ok(())
}

fn open_job(cfg: &Config) -> Result<CleanJob> {
    let catalogue = SqliteCatalogue::open(&cfg.database, backend_registry())
        .with_context(|| format!("opening database {}", cfg.database.display()))?;
    let storage = LocalStorage::create(cfg.media_root.clone())
        .with_context(|| format!("opening media root {}", cfg.media_root.display()))?;
    Ok(CleanJob::new(Arc::new(catalogue), Arc::new(storage)))
}
