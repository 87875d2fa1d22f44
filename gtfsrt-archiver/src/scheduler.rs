//! Feed polling scheduler
//!
//! Owns one fixed-grid timer per active feed. Ticks funnel through the
//! pipeline's global semaphore; per feed, execution is serialized so a slow
//! pipeline can never queue a backlog. Missed grid points coalesce to the
//! latest one, which runs only while still inside the misfire grace.
//!
//! Per-feed state machine:
//!
//! ```text
//!   idle  --tick due-->  queued --permit acquired-->  running
//!    ^                                                  |
//!    +--------- on completion (success or failure) <----+
//!   tick due while queued/running -> coalesce to latest
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use gtfsrt_config::FeedSpec;

/// Grace period after a missed grid point within which the latest missed
/// tick still runs; older misses are always dropped.
pub const MISFIRE_GRACE: Duration = Duration::from_secs(5);

/// Hard deadline for draining in-flight ticks on `stop(wait = true)`.
const STOP_DEADLINE: Duration = Duration::from_secs(30);

/// One admitted tick of work. Implemented by the fetch+upload pipeline;
/// tests substitute instrumented executors.
#[async_trait]
pub trait TickExecutor: Send + Sync + 'static {
    async fn execute_tick(&self, spec: &FeedSpec, scheduled: Instant);
}

fn md5_mod(input: &str, modulus: u64) -> u64 {
    let digest = md5::compute(input.as_bytes());
    (u128::from_be_bytes(digest.0) % modulus as u128) as u64
}

/// Whether this replica owns a feed. MD5 keeps the assignment deterministic
/// across processes and restarts; with a single shard every feed is active.
pub fn should_handle_feed(spec: &FeedSpec, shard_index: u32, total_shards: u32) -> bool {
    if total_shards <= 1 {
        return true;
    }
    md5_mod(&spec.id, total_shards as u64) == shard_index as u64
}

/// Deterministic first-tick offset spreading feeds across their interval so
/// they do not thunder at process start.
pub fn start_offset_seconds(feed_id: &str, interval_seconds: u32) -> u64 {
    md5_mod(feed_id, interval_seconds as u64)
}

/// Scheduler for periodic GTFS-RT feed fetching.
pub struct FeedScheduler {
    feeds: Vec<FeedSpec>,
    executor: Arc<dyn TickExecutor>,
    shard_index: u32,
    total_shards: u32,
    misfire_grace: Duration,

    active_feeds: Mutex<Vec<FeedSpec>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl FeedScheduler {
    pub fn new(
        feeds: Vec<FeedSpec>,
        executor: Arc<dyn TickExecutor>,
        shard_index: u32,
        total_shards: u32,
    ) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            feeds,
            executor,
            shard_index,
            total_shards,
            misfire_grace: MISFIRE_GRACE,
            active_feeds: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stop_tx,
        })
    }

    /// Feeds this replica handles (fixed once started).
    pub async fn active_feeds(&self) -> Vec<FeedSpec> {
        self.active_feeds.lock().await.clone()
    }

    pub async fn job_count(&self) -> usize {
        self.active_feeds.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Filter feeds for this shard, seed staggered timers and start the
    /// per-feed dispatch loops.
    pub async fn start(self: &Arc<Self>) {
        let active: Vec<FeedSpec> = self
            .feeds
            .iter()
            .filter(|f| should_handle_feed(f, self.shard_index, self.total_shards))
            .cloned()
            .collect();

        info!(
            total = self.feeds.len(),
            active = active.len(),
            shard_index = self.shard_index,
            total_shards = self.total_shards,
            "starting scheduler"
        );

        let mut handles = self.handles.lock().await;
        for spec in &active {
            let scheduler = Arc::clone(self);
            let spec = spec.clone();
            handles.push(tokio::spawn(async move {
                scheduler.feed_loop(spec).await;
            }));
        }

        *self.active_feeds.lock().await = active;
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stop dispatching. With `wait`, block until in-flight ticks finish or
    /// the 30 s drain deadline elapses, after which residual tasks abort.
    pub async fn stop(&self, wait: bool) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);

        let mut handles = self.handles.lock().await;
        if wait {
            let drain = async {
                for handle in handles.iter_mut() {
                    let _ = handle.await;
                }
            };
            if tokio::time::timeout(STOP_DEADLINE, drain).await.is_err() {
                warn!("stop deadline elapsed, aborting residual feed loops");
                for handle in handles.iter() {
                    handle.abort();
                }
            }
        } else {
            for handle in handles.iter() {
                handle.abort();
            }
        }
        handles.clear();
        info!("scheduler stopped");
    }

    /// Run a single pipeline for one feed immediately (tests, manual pokes).
    pub async fn run_once(&self, spec: &FeedSpec) {
        self.executor.execute_tick(spec, Instant::now()).await;
    }

    /// Per-feed timer loop. Execution is inline, so ticks for one feed never
    /// overlap; falling behind surfaces as missed grid points which coalesce
    /// below.
    async fn feed_loop(&self, spec: FeedSpec) {
        let interval = Duration::from_secs(spec.interval_seconds as u64);
        let offset = Duration::from_secs(start_offset_seconds(&spec.id, spec.interval_seconds));
        let mut stop_rx = self.stop_tx.subscribe();
        let mut next_fire = Instant::now() + offset;

        debug!(
            feed_id = %spec.id,
            offset_seconds = offset.as_secs(),
            interval_seconds = spec.interval_seconds,
            "feed timer seeded"
        );

        loop {
            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(next_fire) => {}
                _ = stop_rx.changed() => continue,
            }

            let scheduled = next_fire;
            next_fire += interval;
            self.executor.execute_tick(&spec, scheduled).await;

            // Coalesce: when execution overran one or more grid points, drop
            // everything except the latest; run that only inside the grace.
            let now = Instant::now();
            if next_fire <= now {
                let behind = now.duration_since(next_fire);
                let skipped = (behind.as_nanos() / interval.as_nanos()) as u32;
                let latest_missed = next_fire + interval * skipped;

                if now.duration_since(latest_missed) <= self.misfire_grace {
                    if skipped > 0 {
                        warn!(feed_id = %spec.id, skipped, "dropping stale ticks, coalescing to latest");
                    }
                    next_fire = latest_missed;
                } else {
                    warn!(
                        feed_id = %spec.id,
                        skipped = skipped + 1,
                        "missed ticks beyond grace, waiting for next grid point"
                    );
                    next_fire = latest_missed + interval;
                }
            }
        }

        debug!(feed_id = %spec.id, "feed timer stopped");
    }
}
