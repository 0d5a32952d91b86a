//! # ghissue-operator
//!
//! Entry point of the issue operator.
//!
//! ## Startup Sequence
//!
//! 1. **Configuration** - TOML file, environment, then CLI flags
//! 2. **Tracing** - subscriber writing to the configured sink
//! 3. **Issue Service** - GitHub REST client, or the in-memory tracker for dry runs
//! 4. **Record Store** - seeded from the manifest
//! 5. **Controller** - workers, resync and the store change feed
//!
//! ## Shutdown
//!
//! Ctrl+C stops manifest polling and the controller. Workers finish the pass
//! they are running before the process exits.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ghissue_github::{GithubClient, InMemoryIssueService, IssueService};
use ghissue_operator::cli::{Cli, Commands};
use ghissue_operator::{Manifest, ManifestSync, OperatorConfig, init_tracing};
use ghissue_reconciler::{Controller, InMemoryRecordStore, ReconcilerBuilder};
use tokio::signal;
use tracing::{error, info, info_span, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            manifest,
            config,
            workers,
            dry_run,
        } => run(&manifest, config.as_deref(), workers, dry_run).await,
        Commands::Validate { manifest } => validate(&manifest),
    }
}

/// Parse a manifest and print what it declares.
fn validate(path: &Path) -> Result<()> {
    let manifest = Manifest::load(path)
        .with_context(|| format!("Manifest {} is invalid", path.display()))?;

    for record in &manifest.records {
        println!(
            "{}\t{}\t{}",
            record.key(),
            record.spec.repo,
            record.spec.title
        );
    }
    println!("{} record(s) OK", manifest.records.len());
    Ok(())
}

/// Run the controller until Ctrl+C.
async fn run(
    manifest_path: &Path,
    config_path: Option<&Path>,
    workers: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let config = OperatorConfig::load(config_path)
        .context("Failed to load configuration")?
        .with_workers(workers);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging).context("Failed to initialize tracing")?;
    info!(manifest = %manifest_path.display(), dry_run, "ghissue-operator starting");

    let issues = init_issue_service(&config, dry_run)?;
    let store = Arc::new(InMemoryRecordStore::new());

    let reconciler = ReconcilerBuilder::new()
        .with_store(store.clone())
        .with_issues(issues)
        .with_span(info_span!("operator"))
        .build()
        .context("Failed to build reconciler")?;

    let mut sync = ManifestSync::new(store.clone(), manifest_path);
    sync.sync()
        .await
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;

    let controller = Controller::new(Arc::new(reconciler), config.controller.clone())
        .context("Invalid controller configuration")?
        .with_changes(store.subscribe());
    let handle = controller.handle();
    let controller_task = tokio::spawn(controller.run());

    info!("Operator is running. Press Ctrl+C to stop.");
    poll_manifest(&mut sync, config.manifest.poll_interval).await;

    handle.stop();
    controller_task
        .await
        .context("Controller task failed")?
        .context("Controller stopped with an error")?;

    info!("ghissue-operator stopped gracefully");
    Ok(())
}

/// Pick the tracker backend.
fn init_issue_service(config: &OperatorConfig, dry_run: bool) -> Result<Arc<dyn IssueService>> {
    if dry_run {
        warn!("Dry run: issues are tracked in memory only");
        return Ok(Arc::new(InMemoryIssueService::new()));
    }

    if config.github.token.is_none() {
        warn!("No GITHUB_TOKEN set; requests will be unauthenticated");
    }
    let client = GithubClient::with_config(config.github.clone())
        .context("Failed to create GitHub client")?;
    info!(api_url = %config.github.api_url, "GitHub client initialized");
    Ok(Arc::new(client))
}

/// Re-apply the manifest every `interval` until shutdown is requested.
async fn poll_manifest(sync: &mut ManifestSync, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync.sync().await {
                    warn!(path = %sync.path().display(), error = %e, "Manifest reload failed, keeping previous records");
                }
            }
            () = &mut shutdown => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
