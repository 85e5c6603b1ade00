use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use wishlist::{FileStorage, JobsApiClient, SavedJobId, WishlistConfig, WishlistEvent, WishlistStore};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] wishlist::ConfigError),
    #[error(transparent)]
    InvalidJobId(#[from] wishlist::InvalidJobId),
    #[error("jobs API client failed: {0}")]
    Lookup(#[from] wishlist::LookupError),
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to load .env: {0}")]
    DotEnv(#[from] dotenvy::Error),
    #[error("wishlist storage rejected the {0}")]
    Storage(&'static str),
}

#[derive(Parser, Debug)]
#[command(name = "wishlist", about = "Inspect and maintain the saved-jobs wishlist")]
struct Cli {
    /// JSON file holding the storage area.
    #[arg(long, env = "WISHLIST_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Storage key of the wishlist.
    #[arg(long, env = "WISHLIST_STORAGE_KEY")]
    storage_key: Option<String>,

    /// Jobs API origin.
    #[arg(long, env = "JOBS_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Maximum job lookups in flight during `reconcile`.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print machine-readable JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved job ids in save order.
    List,
    /// Print how many jobs are saved.
    Count,
    /// Print whether a job is saved.
    Status { job_id: String },
    /// Save a job, or unsave it if already saved.
    Toggle { job_id: String },
    /// Unsave a job.
    Remove { job_id: String },
    /// Unsave every job.
    Clear,
    /// Drop saved jobs that are gone or closed on the jobs API.
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error.into());
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(WishlistConfig::from_env_raw(), &cli)?;
    tracing::debug!(path = %config.storage_path.display(), key = %config.storage_key, "opening wishlist");

    let store = WishlistStore::new(FileStorage::new(&config.storage_path), config.storage_key.clone());
    let _warnings = store.subscribe(|event| {
        if let WishlistEvent::StorageWarning { reason } = event {
            eprintln!("warning: {reason}");
        }
    });

    run(&cli, &config, &store).await
}

/// Apply command-line overrides on top of env config, then validate once.
fn resolve_config(base: WishlistConfig, cli: &Cli) -> Result<WishlistConfig, CliError> {
    let mut config = base;
    if let Some(path) = &cli.storage_path {
        config.storage_path.clone_from(path);
    }
    if let Some(key) = &cli.storage_key {
        config.storage_key.clone_from(key);
    }
    if let Some(url) = &cli.api_base_url {
        config.api_base_url.clone_from(url);
    }
    if let Some(concurrency) = cli.concurrency {
        config.reconcile_concurrency = concurrency;
    }
    Ok(config.validated()?)
}

async fn run(cli: &Cli, config: &WishlistConfig, store: &WishlistStore<FileStorage>) -> Result<(), CliError> {
    match &cli.command {
        Command::List => {
            let ids = store.list_saved_ids();
            if cli.json {
                print_json(&serde_json::to_value(&ids)?)?;
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
        Command::Count => println!("{}", store.count()),
        Command::Status { job_id } => {
            let id = SavedJobId::new(job_id)?;
            print_saved(cli.json, &id, store.is_saved(&id))?;
        }
        Command::Toggle { job_id } => {
            let id = SavedJobId::new(job_id)?;
            let saved = store.toggle_job(&id);
            print_saved(cli.json, &id, saved)?;
        }
        Command::Remove { job_id } => {
            let id = SavedJobId::new(job_id)?;
            store.remove_job(&id);
            print_saved(cli.json, &id, store.is_saved(&id))?;
        }
        Command::Clear => {
            if !store.clear() {
                return Err(CliError::Storage("clear"));
            }
            println!("0");
        }
        Command::Reconcile => {
            let lookup = JobsApiClient::new(config)?;
            let report = store
                .reconcile_against_live_jobs(&lookup, config.reconcile_concurrency)
                .await;
            if cli.json {
                print_json(&serde_json::json!({
                    "checked": report.checked,
                    "removed": report.removed,
                    "deferred": report.deferred,
                    "stale_kept": report.stale_kept,
                    "notice": report.notice(),
                }))?;
            } else {
                if let Some(notice) = report.notice() {
                    println!("{notice}");
                } else if report.stale_kept.is_empty() {
                    println!("all {} saved job(s) are still available", report.checked - report.deferred.len());
                }
                if !report.stale_kept.is_empty() {
                    eprintln!(
                        "{} unavailable job(s) could not be removed and are still saved",
                        report.stale_kept.len()
                    );
                }
                if !report.deferred.is_empty() {
                    eprintln!("{} job(s) could not be checked and were kept", report.deferred.len());
                }
            }
        }
    }
    Ok(())
}

fn print_saved(json: bool, id: &SavedJobId, saved: bool) -> Result<(), CliError> {
    if json {
        print_json(&serde_json::json!({ "id": id, "saved": saved }))
    } else {
        println!("{id}\t{}", if saved { "saved" } else { "not saved" });
        Ok(())
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
