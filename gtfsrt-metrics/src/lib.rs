//! Prometheus metrics for the GTFS-RT archiver.
//!
//! Every metric lives in an explicitly constructed [`Registry`] owned by the
//! process and passed to [`ArchiverMetrics::new`]; nothing registers into a
//! hidden default registry, so tests get isolated registries for free.
//! Metric names are part of the operational contract and must not change.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prometheus::{
    register_gauge_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, GaugeVec,
    HistogramVec, IntCounterVec, IntGauge, Registry,
};

use gtfsrt_config::FeedSpec;

/// Shared buckets for delay and end-to-end timing histograms.
const TIMING_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0, 15.0, 20.0, 25.0, 30.0,
];

const FETCH_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];
const FETCH_BYTES_BUCKETS: &[f64] = &[1_000.0, 10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0];
const UPLOAD_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

const FEED_LABELS: &[&str] = &["feed_id", "feed_type", "agency"];
const ERROR_LABELS: &[&str] = &["feed_id", "feed_type", "agency", "error_type"];
const BYTES_LABELS: &[&str] = &["feed_id", "feed_type", "agency", "content_type"];

/// Typed handles for every archiver metric plus in-memory last-success
/// tracking for the `/health/feeds` endpoint.
pub struct ArchiverMetrics {
    pub fetch_total: IntCounterVec,
    pub fetch_success: IntCounterVec,
    pub fetch_errors: IntCounterVec,
    pub upload_total: IntCounterVec,
    pub upload_success: IntCounterVec,
    pub upload_errors: IntCounterVec,
    pub processed_bytes: IntCounterVec,

    pub fetch_duration: HistogramVec,
    pub fetch_bytes: HistogramVec,
    pub upload_duration: HistogramVec,
    pub scheduler_delay: HistogramVec,
    pub queue_delay: HistogramVec,
    pub total_delay: HistogramVec,
    pub processing_time: HistogramVec,

    pub active_feeds: IntGauge,
    pub scheduler_jobs: IntGauge,
    pub last_fetch_timestamp: GaugeVec,

    last_success: Mutex<HashMap<String, SystemTime>>,
}

impl ArchiverMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            fetch_total: register_int_counter_vec_with_registry!(
                "gtfs_rt_fetch_total",
                "Total fetch attempts",
                FEED_LABELS,
                registry
            )?,
            fetch_success: register_int_counter_vec_with_registry!(
                "gtfs_rt_fetch_success_total",
                "Successful fetches",
                FEED_LABELS,
                registry
            )?,
            fetch_errors: register_int_counter_vec_with_registry!(
                "gtfs_rt_fetch_errors_total",
                "Failed fetches",
                ERROR_LABELS,
                registry
            )?,
            upload_total: register_int_counter_vec_with_registry!(
                "gtfs_rt_upload_total",
                "Total upload attempts",
                FEED_LABELS,
                registry
            )?,
            upload_success: register_int_counter_vec_with_registry!(
                "gtfs_rt_upload_success_total",
                "Successful blob uploads",
                FEED_LABELS,
                registry
            )?,
            upload_errors: register_int_counter_vec_with_registry!(
                "gtfs_rt_upload_errors_total",
                "Failed blob uploads",
                ERROR_LABELS,
                registry
            )?,
            processed_bytes: register_int_counter_vec_with_registry!(
                "gtfs_rt_processed_bytes_total",
                "Total bytes processed (downloaded and uploaded)",
                BYTES_LABELS,
                registry
            )?,
            fetch_duration: register_histogram_vec_with_registry!(
                "gtfs_rt_fetch_duration_seconds",
                "Time to fetch feed",
                FEED_LABELS,
                FETCH_DURATION_BUCKETS.to_vec(),
                registry
            )?,
            fetch_bytes: register_histogram_vec_with_registry!(
                "gtfs_rt_fetch_bytes",
                "Response size in bytes",
                FEED_LABELS,
                FETCH_BYTES_BUCKETS.to_vec(),
                registry
            )?,
            upload_duration: register_histogram_vec_with_registry!(
                "gtfs_rt_upload_duration_seconds",
                "Time to upload to the blob store",
                FEED_LABELS,
                UPLOAD_DURATION_BUCKETS.to_vec(),
                registry
            )?,
            scheduler_delay: register_histogram_vec_with_registry!(
                "gtfs_rt_scheduler_delay_seconds",
                "Time from scheduled tick to job dispatch",
                FEED_LABELS,
                TIMING_BUCKETS.to_vec(),
                registry
            )?,
            queue_delay: register_histogram_vec_with_registry!(
                "gtfs_rt_queue_delay_seconds",
                "Time waiting for the concurrency semaphore",
                FEED_LABELS,
                TIMING_BUCKETS.to_vec(),
                registry
            )?,
            total_delay: register_histogram_vec_with_registry!(
                "gtfs_rt_total_delay_seconds",
                "Total time from scheduled tick to job start",
                FEED_LABELS,
                TIMING_BUCKETS.to_vec(),
                registry
            )?,
            processing_time: register_histogram_vec_with_registry!(
                "gtfs_rt_processing_time_seconds",
                "Total time to fetch and upload (end-to-end)",
                FEED_LABELS,
                TIMING_BUCKETS.to_vec(),
                registry
            )?,
            active_feeds: register_int_gauge_with_registry!(
                "gtfs_rt_active_feeds",
                "Number of feeds handled by this instance",
                registry
            )?,
            scheduler_jobs: register_int_gauge_with_registry!(
                "gtfs_rt_scheduler_jobs",
                "Number of scheduled jobs",
                registry
            )?,
            last_fetch_timestamp: register_gauge_vec_with_registry!(
                "gtfs_rt_last_fetch_timestamp",
                "Unix timestamp of last fetch attempt",
                &["feed_id"],
                registry
            )?,
            last_success: Mutex::new(HashMap::new()),
        })
    }

    fn labels<'a>(spec: &'a FeedSpec) -> [&'a str; 3] {
        [&spec.id, spec.feed_type.as_str(), &spec.agency_id]
    }

    pub fn record_fetch_attempt(&self, spec: &FeedSpec) {
        self.fetch_total.with_label_values(&Self::labels(spec)).inc();
    }

    pub fn record_fetch_success(&self, spec: &FeedSpec, duration_seconds: f64, bytes: usize) {
        let labels = Self::labels(spec);
        self.fetch_success.with_label_values(&labels).inc();
        self.fetch_duration
            .with_label_values(&labels)
            .observe(duration_seconds);
        self.fetch_bytes
            .with_label_values(&labels)
            .observe(bytes as f64);
        self.touch_last_fetch(&spec.id);
    }

    pub fn record_fetch_error(&self, spec: &FeedSpec, error_type: &str) {
        self.fetch_errors
            .with_label_values(&[&spec.id, spec.feed_type.as_str(), &spec.agency_id, error_type])
            .inc();
        self.touch_last_fetch(&spec.id);
    }

    pub fn record_upload_attempt(&self, spec: &FeedSpec) {
        self.upload_total.with_label_values(&Self::labels(spec)).inc();
    }

    pub fn record_upload_success(&self, spec: &FeedSpec, duration_seconds: f64) {
        let labels = Self::labels(spec);
        self.upload_success.with_label_values(&labels).inc();
        self.upload_duration
            .with_label_values(&labels)
            .observe(duration_seconds);
    }

    pub fn record_upload_error(&self, spec: &FeedSpec, error_type: &str) {
        self.upload_errors
            .with_label_values(&[&spec.id, spec.feed_type.as_str(), &spec.agency_id, error_type])
            .inc();
    }

    pub fn record_processed_bytes(&self, spec: &FeedSpec, content_type: &str, bytes: usize) {
        self.processed_bytes
            .with_label_values(&[
                &spec.id,
                spec.feed_type.as_str(),
                &spec.agency_id,
                content_type,
            ])
            .inc_by(bytes as u64);
    }

    pub fn record_scheduler_delay(&self, spec: &FeedSpec, seconds: f64) {
        self.scheduler_delay
            .with_label_values(&Self::labels(spec))
            .observe(seconds);
    }

    pub fn record_queue_delay(&self, spec: &FeedSpec, seconds: f64) {
        self.queue_delay
            .with_label_values(&Self::labels(spec))
            .observe(seconds);
    }

    pub fn record_total_delay(&self, spec: &FeedSpec, seconds: f64) {
        self.total_delay
            .with_label_values(&Self::labels(spec))
            .observe(seconds);
    }

    pub fn record_processing_time(&self, spec: &FeedSpec, seconds: f64) {
        self.processing_time
            .with_label_values(&Self::labels(spec))
            .observe(seconds);
    }

    /// Record a full fetch+upload success for `/health/feeds`.
    pub fn record_feed_success(&self, feed_id: &str) {
        if let Ok(mut map) = self.last_success.lock() {
            map.insert(feed_id.to_string(), SystemTime::now());
        }
    }

    /// Seconds since the feed last completed a full cycle, if ever.
    pub fn last_success_seconds_ago(&self, feed_id: &str) -> Option<f64> {
        let map = self.last_success.lock().ok()?;
        let then = map.get(feed_id)?;
        Some(
            SystemTime::now()
                .duration_since(*then)
                .unwrap_or(Duration::ZERO)
                .as_secs_f64(),
        )
    }

    fn touch_last_fetch(&self, feed_id: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        self.last_fetch_timestamp
            .with_label_values(&[feed_id])
            .set(now);
    }
}
