//! GTFS-RT archiver entry point

use std::sync::Arc;

use anyhow::Context;
use prometheus::Registry;
use tracing::info;

use gtfsrt_archiver::health::{HealthServer, HealthState};
use gtfsrt_archiver::logging::init_logging;
use gtfsrt_archiver::{FeedScheduler, FetchPipeline};
use gtfsrt_config::{load_feed_specs, Settings};
use gtfsrt_http::build_client;
use gtfsrt_metrics::ArchiverMetrics;
use gtfsrt_resilience::ShutdownCoordinator;
use gtfsrt_secrets::{EnvSecretStore, SecretResolver};
use gtfsrt_storage::BlobWriter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid environment settings")?;
    init_logging(&settings.log_level, settings.log_format);

    info!(
        config_path = %settings.config_path.display(),
        bucket = %settings.bucket,
        shard_index = settings.shard_index,
        total_shards = settings.total_shards,
        "starting archiver"
    );

    let mut feeds =
        load_feed_specs(&settings.config_path).context("failed to load feed catalog")?;
    info!(feed_count = feeds.len(), "catalog loaded");

    let resolver = SecretResolver::new(Arc::new(EnvSecretStore));
    resolver
        .resolve_feed_specs(&mut feeds)
        .await
        .context("failed to resolve feed secrets")?;

    let client = build_client(settings.max_concurrent).context("failed to build HTTP client")?;
    let writer = Arc::new(BlobWriter::new(&settings.bucket, true));
    let registry = Registry::new();
    let metrics = Arc::new(ArchiverMetrics::new(&registry)?);
    let shutdown = ShutdownCoordinator::new();

    let pipeline = Arc::new(FetchPipeline::new(
        client,
        writer,
        metrics.clone(),
        settings.max_concurrent,
        shutdown.clone(),
    ));
    let scheduler = FeedScheduler::new(
        feeds,
        pipeline,
        settings.shard_index,
        settings.total_shards,
    );

    let state = HealthState::new(scheduler.clone(), metrics.clone(), registry);
    let mut health = HealthServer::new(settings.health_port, state);
    health.start().await.context("failed to start health server")?;

    scheduler.start().await;
    let jobs = scheduler.job_count().await as i64;
    metrics.active_feeds.set(jobs);
    metrics.scheduler_jobs.set(jobs);
    info!(active_feeds = jobs, "scheduler started");

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");

    // Stop dispatch and drain in-flight ticks (bounded internally), then
    // release shared handles; the health endpoint goes down last.
    shutdown.signal();
    scheduler.stop(true).await;
    health.stop().await;
    info!("shutdown complete");

    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
