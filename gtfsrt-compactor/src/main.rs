//! Compactor CLI entry point
//!
//! One invocation compacts one `(feed_type, date, feed)` partition; the
//! workflow orchestrator decides which partitions run and when.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::ObjectStore;
use tracing_subscriber::EnvFilter;

use gtfsrt_compactor::{Compactor, PartitionKey};
use gtfsrt_config::FeedType;

#[derive(Debug, Parser)]
#[command(name = "gtfsrt-compactor", about = "Compact archived GTFS-RT protobufs into Parquet")]
struct Cli {
    /// Feed type: vehicle_positions, trip_updates or service_alerts
    #[arg(long)]
    feed_type: FeedType,

    /// UTC calendar day, YYYY-MM-DD
    #[arg(long)]
    date: String,

    /// Partition feed key (canonical URL with scheme stripped, `~` for http)
    #[arg(long)]
    feed: String,

    /// Bucket holding archived protobuf snapshots
    #[arg(long, env = "GCS_BUCKET_RT_PROTOBUF")]
    input_bucket: String,

    /// Bucket receiving compacted Parquet files
    #[arg(long, env = "GCS_BUCKET_RT_PARQUET")]
    output_bucket: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let partition = PartitionKey::new(cli.feed_type, &cli.date, &cli.feed)
        .map_err(anyhow::Error::msg)
        .context("invalid partition")?;

    let input: Arc<dyn ObjectStore> = Arc::new(
        GoogleCloudStorageBuilder::new()
            .with_bucket_name(&cli.input_bucket)
            .build()
            .context("failed to open input bucket")?,
    );
    let output: Arc<dyn ObjectStore> = Arc::new(
        GoogleCloudStorageBuilder::new()
            .with_bucket_name(&cli.output_bucket)
            .build()
            .context("failed to open output bucket")?,
    );

    let summary = Compactor::new(input, output)
        .compact(&partition)
        .await
        .with_context(|| format!("compaction failed for {partition}"))?;

    println!(
        "{}",
        serde_json::json!({
            "partition": partition.to_string(),
            "input_objects": summary.input_objects,
            "rows_written": summary.rows_written,
        })
    );
    Ok(())
}
