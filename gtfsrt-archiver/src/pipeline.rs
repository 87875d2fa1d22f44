//! Per-tick fetch + upload pipeline
//!
//! One invocation handles one admitted tick end-to-end: acquire the global
//! permit, fetch, archive, translate the outcome into metrics. Errors are
//! consumed here; nothing escapes to the scheduler and a failed tick never
//! leaks a permit or schedules extra work.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::scheduler::TickExecutor;
use gtfsrt_config::FeedSpec;
use gtfsrt_http::{fetch_feed, FetchError};
use gtfsrt_metrics::ArchiverMetrics;
use gtfsrt_resilience::{RetryExecutor, RetryPolicy, ShutdownCoordinator};
use gtfsrt_storage::{BlobWriter, StorageError};

/// Shared pipeline state for every feed tick.
pub struct FetchPipeline {
    client: reqwest::Client,
    writer: Arc<BlobWriter>,
    metrics: Arc<ArchiverMetrics>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl FetchPipeline {
    pub fn new(
        client: reqwest::Client,
        writer: Arc<BlobWriter>,
        metrics: Arc<ArchiverMetrics>,
        max_concurrent: usize,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            client,
            writer,
            metrics,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            shutdown,
        }
    }

    /// Run one tick for `spec`, scheduled at `scheduled`.
    ///
    /// Measures the three delay segments: tick emission to dispatch
    /// (scheduler delay), dispatch to permit acquisition (queue delay), and
    /// their sum (total delay).
    pub async fn execute_tick(&self, spec: &FeedSpec, scheduled: Instant) {
        let dispatched = Instant::now();
        self.metrics
            .record_scheduler_delay(spec, (dispatched - scheduled).as_secs_f64());

        let Ok(permit) = self.semaphore.acquire().await else {
            // Semaphore closed: process is shutting down
            return;
        };

        let work_start = Instant::now();
        self.metrics
            .record_queue_delay(spec, (work_start - dispatched).as_secs_f64());
        self.metrics
            .record_total_delay(spec, (work_start - scheduled).as_secs_f64());

        self.shutdown.task_started();
        self.run(spec, work_start).await;
        self.shutdown.task_completed();
        drop(permit);
    }

    async fn run(&self, spec: &FeedSpec, work_start: Instant) {
        self.metrics.record_fetch_attempt(spec);

        let outcome = match fetch_feed(&self.client, spec).await {
            Ok(outcome) => outcome,
            Err(FetchError::NonRetryable { status }) => {
                self.metrics
                    .record_fetch_error(spec, &format!("http_{status}"));
                warn!(feed_id = %spec.id, status, "fetch returned non-retryable status");
                return;
            }
            Err(err) => {
                self.metrics.record_fetch_error(spec, &err.error_type());
                error!(feed_id = %spec.id, error_type = %err.error_type(), %err, "fetch failed");
                return;
            }
        };

        self.metrics
            .record_fetch_success(spec, outcome.duration_ms / 1000.0, outcome.content_length);
        info!(
            feed_id = %spec.id,
            duration_ms = outcome.duration_ms,
            content_length = outcome.content_length,
            "fetch succeeded"
        );

        self.metrics.record_upload_attempt(spec);
        let upload_start = Instant::now();
        let executor = RetryExecutor::new(RetryPolicy::upload());
        match executor.execute(|| self.writer.write(spec, &outcome)).await {
            Ok(key) => {
                let upload_seconds = upload_start.elapsed().as_secs_f64();
                self.metrics.record_upload_success(spec, upload_seconds);
                self.metrics.record_processed_bytes(
                    spec,
                    outcome.content_type().unwrap_or("unknown"),
                    outcome.content_length,
                );
                self.metrics
                    .record_processing_time(spec, work_start.elapsed().as_secs_f64());
                self.metrics.record_feed_success(&spec.id);
                info!(feed_id = %spec.id, key = %key, duration_seconds = upload_seconds, "snapshot uploaded");
            }
            Err(err) => {
                let err = err.into_inner();
                self.metrics.record_upload_error(spec, upload_error_type(&err));
                error!(feed_id = %spec.id, %err, "upload failed after retries");
            }
        }
    }
}

#[async_trait]
impl TickExecutor for FetchPipeline {
    async fn execute_tick(&self, spec: &FeedSpec, scheduled: Instant) {
        FetchPipeline::execute_tick(self, spec, scheduled).await;
    }
}

fn upload_error_type(err: &StorageError) -> &'static str {
    match err {
        StorageError::Store(_) => "store",
        StorageError::Metadata(_) => "metadata",
    }
}
