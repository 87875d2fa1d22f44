//! GTFS-RT archiver service.
//!
//! Wires the feed catalog, secret resolver, HTTP fetcher and blob writer into
//! a sharded, staggered, concurrency-capped polling scheduler with a health
//! and metrics endpoint.

pub mod health;
pub mod logging;
pub mod pipeline;
pub mod scheduler;

pub use pipeline::FetchPipeline;
pub use scheduler::{should_handle_feed, start_offset_seconds, FeedScheduler};
