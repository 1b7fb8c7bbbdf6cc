// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bundle_dl::prelude::*;
use clap::Parser;

/// Download the files of a map bundle into local storage.
#[derive(Debug, Parser)]
#[command(name = "bundle-dl", version)]
struct Cli {
    /// JSON manifest listing the bundle id, its files and the remap table.
    manifest: PathBuf,

    /// Tool configuration (API base, token, storage root).
    #[arg(short, long, default_value = "bundle-dl.json")]
    config: PathBuf,

    /// Override the configured number of parallel transfers.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Write the per-file outcomes as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Logs aggregate progress whenever another file finishes.
struct LogObserver;

impl BatchObserver for LogObserver {
    fn on_file_complete(&self, file: &FileDescriptor, status: OutcomeStatus) {
        tracing::info!(file = file.file_name(), kind = ?file.kind, ?status, "file finished");
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        tracing::debug!(
            done = snapshot.finished_files(),
            total = snapshot.total_files,
            percent = format_args!("{:.0}", snapshot.fraction() * 100.0),
            current = snapshot.current_file.as_deref().unwrap_or(""),
            "progress"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .await
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(concurrency) = cli.concurrency {
        config.manager.concurrency = concurrency;
    }

    let raw = tokio::fs::read_to_string(&cli.manifest)
        .await
        .with_context(|| format!("reading manifest {}", cli.manifest.display()))?;
    let manifest: BundleManifest = serde_json::from_str(&raw).context("parsing manifest")?;

    let fetcher = HttpFetcher::new(FetcherOptions {
        api_base: config.api_base.clone(),
        token: config.token.clone(),
        timeout: config.request_timeout(),
        user_agent: config.user_agent.clone(),
    })?;
    let storage = FsStorage::new(&config.storage_root);
    tracing::info!(
        bundle = %manifest.bundle_id,
        root = %storage.root().display(),
        files = manifest.files.len(),
        "downloading bundle"
    );

    let manager = Arc::new(
        DownloadManager::new(config.manager.clone(), Arc::new(fetcher), Arc::new(storage))?
            .with_observer(Arc::new(LogObserver)),
    );

    let ctrl_c = {
        let manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, finishing transfers in progress");
                manager.abort();
            }
        })
    };

    let outcomes = manager
        .process(&manifest.bundle_id, &manifest.files, &manifest.remap)
        .await?;
    ctrl_c.abort();

    let summary = BatchSummary::from_outcomes(&outcomes);
    let unattempted = BatchSummary::unattempted(&manifest.files, &outcomes);
    println!(
        "{}: {} completed ({} already present), {} failed, {} not attempted",
        manifest.bundle_id,
        summary.completed,
        summary.skipped,
        summary.failed,
        unattempted.len()
    );
    for outcome in outcomes.iter().filter(|o| !o.is_completed()) {
        println!(
            "  failed {}: {}",
            outcome.descriptor.path,
            outcome.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    if let Some(report) = &cli.report {
        let json = serde_json::to_string_pretty(&outcomes)?;
        tokio::fs::write(report, json)
            .await
            .with_context(|| format!("writing report {}", report.display()))?;
    }

    if summary.failed > 0 || !unattempted.is_empty() {
        bail!("bundle {} is incomplete", manifest.bundle_id);
    }
    Ok(())
}
